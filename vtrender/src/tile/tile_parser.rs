//! Decodes Mapbox vector tiles into [`SourceLayer`]s.

use geozero::{
    error::GeozeroError,
    mvt::{Message, Tile},
    ColumnValue, FeatureProcessor, GeomProcessor, GeozeroDatasource, PropertyProcessor,
};
use thiserror::Error;

use crate::{
    tile::{Feature, GeometryType, Properties, PropertyValue, RawTile, SourceLayer},
    util::math::TilePoint,
};

type GeoResult<T> = geozero::error::Result<T>;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("decoding protobuf failed: {0}")]
    Protobuf(String),
    #[error("processing layer `{layer}` failed")]
    Layer {
        layer: String,
        #[source]
        source: GeozeroError,
    },
}

#[derive(Default)]
pub struct TileParser;

impl TileParser {
    pub fn parse(data: &[u8]) -> Result<Vec<SourceLayer>, ParseError> {
        let mut tile = Tile::decode(data).map_err(|e| ParseError::Protobuf(e.to_string()))?;

        let mut layers = Vec::with_capacity(tile.layers.len());
        for layer in &mut tile.layers {
            let mut collector = LayerCollector {
                ids: layer.features.iter().map(|feature| feature.id).collect(),
                extent: layer.extent,
                ..LayerCollector::default()
            };

            layer
                .process(&mut collector)
                .map_err(|source| ParseError::Layer {
                    layer: layer.name.clone(),
                    source,
                })?;

            log::debug!(
                "decoded layer {} with {} features",
                layer.name,
                collector.features.len()
            );

            layers.push(SourceLayer {
                name: layer.name.clone(),
                extent: layer.extent,
                features: collector.features,
            });
        }

        Ok(layers)
    }

    pub fn parse_raw(raw: RawTile) -> Result<Vec<SourceLayer>, ParseError> {
        match raw {
            RawTile::Mvt(data) => Self::parse(&data),
            RawTile::Layers(layers) => Ok(layers),
        }
    }
}

#[derive(Default)]
struct FeatureBuilder {
    id: Option<u64>,
    geometry_type: Option<GeometryType>,
    geometry: Vec<Vec<TilePoint>>,
    properties: Properties,
}

/// Collects the features of one layer while geozero walks through it.
#[derive(Default)]
struct LayerCollector {
    ids: Vec<Option<u64>>,
    extent: Option<u32>,
    current: Option<FeatureBuilder>,
    ring: Vec<TilePoint>,
    features: Vec<Feature>,
}

impl LayerCollector {
    fn set_type(&mut self, geometry_type: GeometryType) {
        if let Some(current) = &mut self.current {
            // Rings of polygons are reported as line strings.
            if current.geometry_type != Some(GeometryType::Polygon) {
                current.geometry_type = Some(geometry_type);
            }
        }
    }

    fn flush_ring(&mut self) {
        if self.ring.is_empty() {
            return;
        }
        let ring = std::mem::take(&mut self.ring);
        if let Some(current) = &mut self.current {
            current.geometry.push(ring);
        }
    }
}

impl GeomProcessor for LayerCollector {
    fn xy(&mut self, x: f64, y: f64, _idx: usize) -> GeoResult<()> {
        self.ring.push([x, y, 0.0]);
        Ok(())
    }

    fn point_begin(&mut self, _idx: usize) -> GeoResult<()> {
        self.set_type(GeometryType::Point);
        Ok(())
    }

    fn point_end(&mut self, _idx: usize) -> GeoResult<()> {
        self.flush_ring();
        Ok(())
    }

    fn multipoint_begin(&mut self, _size: usize, _idx: usize) -> GeoResult<()> {
        self.set_type(GeometryType::Point);
        Ok(())
    }

    fn multipoint_end(&mut self, _idx: usize) -> GeoResult<()> {
        self.flush_ring();
        Ok(())
    }

    fn linestring_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> GeoResult<()> {
        self.set_type(GeometryType::LineString);
        self.flush_ring();
        Ok(())
    }

    fn linestring_end(&mut self, _tagged: bool, _idx: usize) -> GeoResult<()> {
        self.flush_ring();
        Ok(())
    }

    fn polygon_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> GeoResult<()> {
        self.set_type(GeometryType::Polygon);
        Ok(())
    }

    fn multipolygon_begin(&mut self, _size: usize, _idx: usize) -> GeoResult<()> {
        self.set_type(GeometryType::Polygon);
        Ok(())
    }
}

impl PropertyProcessor for LayerCollector {
    fn property(&mut self, _idx: usize, name: &str, value: &ColumnValue) -> GeoResult<bool> {
        let value = match value {
            ColumnValue::Bool(value) => PropertyValue::Bool(*value),
            ColumnValue::Byte(value) => PropertyValue::Number(*value as f64),
            ColumnValue::UByte(value) => PropertyValue::Number(*value as f64),
            ColumnValue::Short(value) => PropertyValue::Number(*value as f64),
            ColumnValue::UShort(value) => PropertyValue::Number(*value as f64),
            ColumnValue::Int(value) => PropertyValue::Number(*value as f64),
            ColumnValue::UInt(value) => PropertyValue::Number(*value as f64),
            ColumnValue::Long(value) => PropertyValue::Number(*value as f64),
            ColumnValue::ULong(value) => PropertyValue::Number(*value as f64),
            ColumnValue::Float(value) => PropertyValue::Number(*value as f64),
            ColumnValue::Double(value) => PropertyValue::Number(*value),
            ColumnValue::String(value) => PropertyValue::String((*value).to_owned()),
            // Json, dates and binary blobs are not used for styling.
            _ => return Ok(false),
        };

        if let Some(current) = &mut self.current {
            current.properties.insert(name.to_owned(), value);
        }
        Ok(false)
    }
}

impl FeatureProcessor for LayerCollector {
    fn feature_begin(&mut self, idx: u64) -> GeoResult<()> {
        self.ring.clear();
        self.current = Some(FeatureBuilder {
            id: self.ids.get(idx as usize).copied().flatten(),
            ..FeatureBuilder::default()
        });
        Ok(())
    }

    fn feature_end(&mut self, _idx: u64) -> GeoResult<()> {
        self.flush_ring();
        let Some(builder) = self.current.take() else {
            return Ok(());
        };

        match builder.geometry_type {
            Some(geometry_type) if !builder.geometry.is_empty() => {
                self.features.push(Feature {
                    id: builder.id,
                    geometry_type,
                    geometry: builder.geometry,
                    properties: builder.properties,
                    extent: self.extent,
                });
            }
            _ => log::debug!("skipping feature without geometry"),
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use geozero::mvt::{tile, Message, Tile};

    use crate::tile::{tile_parser::TileParser, GeometryType, PropertyValue};

    fn zigzag(value: i32) -> u32 {
        ((value << 1) ^ (value >> 31)) as u32
    }

    fn command(id: u32, count: u32) -> u32 {
        (id & 0x7) | (count << 3)
    }

    /// Encodes a closed ring with the MVT command stream.
    pub(crate) fn encode_ring(points: &[(i32, i32)], cursor: &mut (i32, i32)) -> Vec<u32> {
        let mut geometry = vec![command(1, 1)];
        let (x, y) = points[0];
        geometry.push(zigzag(x - cursor.0));
        geometry.push(zigzag(y - cursor.1));
        *cursor = (x, y);

        geometry.push(command(2, points.len() as u32 - 1));
        for &(x, y) in &points[1..] {
            geometry.push(zigzag(x - cursor.0));
            geometry.push(zigzag(y - cursor.1));
            *cursor = (x, y);
        }
        geometry.push(command(7, 1));
        geometry
    }

    pub(crate) fn square_tile() -> Vec<u8> {
        let mut cursor = (0, 0);
        let geometry = encode_ring(&[(0, 0), (4096, 0), (4096, 4096), (0, 4096)], &mut cursor);

        let layer = tile::Layer {
            version: 2,
            name: "water".to_owned(),
            features: vec![tile::Feature {
                id: Some(7),
                tags: vec![0, 0],
                r#type: Some(tile::GeomType::Polygon as i32),
                geometry,
            }],
            keys: vec!["kind".to_owned()],
            values: vec![tile::Value {
                string_value: Some("lake".to_owned()),
                ..Default::default()
            }],
            extent: Some(4096),
        };

        Tile {
            layers: vec![layer],
        }
        .encode_to_vec()
    }

    #[test]
    fn test_parse_polygon_layer() {
        let layers = TileParser::parse(&square_tile()).unwrap();
        assert_eq!(layers.len(), 1);

        let layer = &layers[0];
        assert_eq!(layer.name, "water");
        assert_eq!(layer.extent, Some(4096));
        assert_eq!(layer.features.len(), 1);

        let feature = &layer.features[0];
        assert_eq!(feature.id, Some(7));
        assert_eq!(feature.geometry_type, GeometryType::Polygon);
        assert_eq!(
            feature.properties.get("kind"),
            Some(&PropertyValue::String("lake".to_owned()))
        );
        assert!(feature.geometry[0].len() >= 4);
        assert!(feature.geometry[0].contains(&[4096.0, 4096.0, 0.0]));
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(TileParser::parse(&[0xff, 0xff, 0xff]).is_err());
    }
}
