//! Packs polygon features into triangles.

use crate::{
    pack::{
        classify_rings::classify_rings,
        clip::{clip_polygon, strip_closing_point},
        triangulate::triangulate,
        AttributeFormat, AttributeType, NumericType, PackError, PackOptions, StyledVector,
        VectorPack, VertexWriter, A_COLOR, A_OPACITY, A_PICKING_ID, A_POSITION, A_TEX_INFO,
        A_UV_OFFSET, A_UV_SCALE, LINE_INDICES,
    },
    style::symbol::{is_feature_function, FillSymbol},
    util::math::{Aabb2, TilePoint},
};

/// Tile bounds are padded by one unit before clipping, so that adjacent tiles overlap.
const CLIP_PADDING: f64 = 1.0;

pub struct PolygonPack<'a> {
    options: &'a PackOptions,
    has_color: bool,
    has_opacity: bool,
    has_uv_scale: bool,
    has_uv_offset: bool,
    has_pattern: bool,
}

impl<'a> PolygonPack<'a> {
    pub fn new(symbol: &FillSymbol, options: &'a PackOptions) -> Self {
        Self {
            options,
            has_color: is_feature_function(&symbol.polygon_fill),
            has_opacity: is_feature_function(&symbol.polygon_opacity),
            has_uv_scale: is_feature_function(&symbol.uv_scale),
            has_uv_offset: is_feature_function(&symbol.uv_offset),
            has_pattern: options.atlas.is_some() && symbol.polygon_pattern_file.is_some(),
        }
    }

    /// Atlas coordinates do not fit a byte when the atlas is larger than 255 pixels.
    fn wide_atlas(&self) -> bool {
        self.options
            .atlas
            .as_ref()
            .map_or(false, |atlas| atlas.exceeds_u8())
    }

    /// Style components appended to every vertex of a feature, in format order.
    fn style_values(&self, vector: &StyledVector<'_>) -> Vec<f64> {
        let style = &vector.style;
        let mut values = Vec::new();

        if self.has_color {
            let color = style.color.unwrap_or([1.0; 4]);
            values.extend(color.iter().map(|c| (*c as f64 * 255.0).round()));
        }
        if self.has_opacity {
            values.push(style.opacity.unwrap_or(1.0) * 255.0);
        }
        if self.has_uv_scale {
            let [u, v] = style.uv_scale.unwrap_or([1.0, 1.0]);
            let factor = if self.wide_atlas() { 10.0 } else { 255.0 };
            values.extend([u * factor, v * factor]);
        }
        if self.has_uv_offset {
            let [u, v] = style.uv_offset.unwrap_or([0.0, 0.0]);
            values.extend([u * 255.0, v * 255.0]);
        }
        if self.has_pattern {
            let position = style.pattern.as_ref().and_then(|pattern| {
                self.options
                    .atlas
                    .as_ref()
                    .and_then(|atlas| atlas.positions.get(pattern))
            });
            match position {
                Some(position) => values.extend([
                    position.tl[0] + 1.0,
                    position.tl[1] + 1.0,
                    position.display_size[0] - 3.0,
                    position.display_size[1] - 3.0,
                ]),
                None => values.extend([0.0; 4]),
            }
        }
        values
    }
}

impl VectorPack for PolygonPack<'_> {
    fn format(&self) -> Vec<AttributeFormat> {
        let atlas_type = if self.wide_atlas() {
            NumericType::U16
        } else {
            NumericType::U8
        };

        let mut format = vec![
            AttributeFormat::new(A_POSITION, 3, AttributeType::Position),
            AttributeFormat::new(A_PICKING_ID, 1, AttributeType::PickingId),
        ];
        if self.has_color {
            format.push(AttributeFormat::new(A_COLOR, 4, AttributeType::Fixed(NumericType::U8)));
        }
        if self.has_opacity {
            format.push(AttributeFormat::new(A_OPACITY, 1, AttributeType::Fixed(NumericType::U8)));
        }
        if self.has_uv_scale {
            format.push(AttributeFormat::new(A_UV_SCALE, 2, AttributeType::Fixed(atlas_type)));
        }
        if self.has_uv_offset {
            format.push(AttributeFormat::new(A_UV_OFFSET, 2, AttributeType::Fixed(NumericType::U8)));
        }
        if self.has_pattern {
            format.push(AttributeFormat::new(A_TEX_INFO, 4, AttributeType::Fixed(atlas_type)));
        }
        format
    }

    fn place_vector(
        &self,
        vector: &StyledVector<'_>,
        scale: f64,
        writer: &mut VertexWriter,
    ) -> Result<(), PackError> {
        let feature = vector.feature;
        let polygons = classify_rings(&feature.geometry, self.options.max_rings)?;

        let bounds = match feature.extent {
            Some(extent) if self.options.clip_to_tile && !feature.has_altitude() => {
                Some(Aabb2::padded_extent(extent as f64, CLIP_PADDING))
            }
            _ => None,
        };
        let style_values = self.style_values(vector);

        for polygon in polygons {
            let mut points: Vec<TilePoint> = Vec::new();
            let mut holes = Vec::new();
            let mut ring_ranges = Vec::new();

            for (i, ring) in polygon.iter().enumerate() {
                let mut ring = strip_closing_point(ring.to_vec());
                if let Some(bounds) = &bounds {
                    ring = clip_polygon(&ring, bounds);
                }
                if ring.len() < 3 {
                    if i == 0 {
                        break;
                    }
                    continue;
                }
                if i != 0 {
                    holes.push(points.len());
                }
                ring_ranges.push((points.len(), ring.len()));
                points.extend(ring);
            }

            let triangles = triangulate(&points, &holes);
            if triangles.is_empty() {
                continue;
            }

            let base = writer.vertex_count();
            let mut vertex = Vec::with_capacity(writer.stride());
            for point in &points {
                vertex.clear();
                vertex.extend([point[0] * scale, point[1] * scale, point[2]]);
                vertex.push(vector.picking_id as f64);
                vertex.extend_from_slice(&style_values);
                writer.push_vertex(&vertex);
            }
            writer.push_elements(base, &triangles);

            if self.options.line_elements {
                for (start, len) in ring_ranges {
                    let start = base + start as u32;
                    for i in 0..len as u32 {
                        writer.push_aux(LINE_INDICES, start + i, start + (i + 1) % len as u32);
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::{
        pack::{
            create_styled_vector, polygon::PolygonPack, AttributeData, IconAtlas, IconPosition,
            IndexWidth, NumericType, PackOptions, VectorPack, A_COLOR, A_OPACITY, A_POSITION,
            A_TEX_INFO, A_UV_SCALE, LINE_INDICES,
        },
        style::symbol::{FillSymbol, Symbol},
        tile::{Feature, GeometryType},
        util::math::TilePoint,
    };

    fn rectangle() -> Vec<TilePoint> {
        vec![
            [0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0],
            [10.0, 10.0, 0.0],
            [0.0, 10.0, 0.0],
            [0.0, 0.0, 0.0],
        ]
    }

    fn fill_symbol(symbol: serde_json::Value) -> FillSymbol {
        serde_json::from_value(symbol).unwrap()
    }

    fn pack(
        features: &[Feature],
        symbol: &FillSymbol,
        options: &PackOptions,
    ) -> Option<crate::pack::PackedTileBuffer> {
        let wrapped = Symbol::Fill(symbol.clone());
        let vectors: Vec<_> = features
            .iter()
            .enumerate()
            .map(|(i, feature)| create_styled_vector(feature, i as u32, &wrapped, 10.0).unwrap())
            .collect();
        PolygonPack::new(symbol, options).pack(&vectors, 1.0)
    }

    #[test]
    fn test_rectangle() {
        let feature = Feature::new(GeometryType::Polygon, vec![rectangle()]);
        let buffer = pack(&[feature], &FillSymbol::default(), &PackOptions::default()).unwrap();

        assert_eq!(buffer.vertex_count, 4);
        assert_eq!(buffer.triangle_count(), 2);
        assert_eq!(buffer.indices.width(), IndexWidth::U8);
        assert_eq!(buffer.attributes.len(), 2);
        assert!(buffer.is_consistent());
    }

    #[test]
    fn test_convex_ring_triangle_count() {
        for k in [3, 5, 12, 40] {
            let ring = (0..k)
                .map(|i| {
                    let angle = i as f64 / k as f64 * std::f64::consts::TAU;
                    [
                        (angle.cos() * 1000.0).round() + 2048.0,
                        (angle.sin() * 1000.0).round() + 2048.0,
                        0.0,
                    ]
                })
                .collect();
            let feature = Feature::new(GeometryType::Polygon, vec![ring]);
            let buffer = pack(&[feature], &FillSymbol::default(), &PackOptions::default()).unwrap();
            assert_eq!(buffer.triangle_count(), k - 2);
        }
    }

    #[test]
    fn test_feature_functions_add_attributes() {
        let symbol = fill_symbol(json!({
            "polygonFill": {"property": "kind", "type": "categorical", "stops": [["lake", "#ff0000"]]},
            "polygonOpacity": {"property": "alpha", "type": "identity"},
            "uvScale": {"property": "size", "stops": [[0, [1, 1]]]}
        }));
        let feature = Feature::new(GeometryType::Polygon, vec![rectangle()])
            .with_property("kind", "lake")
            .with_property("alpha", 0.5);

        let buffer = pack(&[feature], &symbol, &PackOptions::default()).unwrap();
        assert_eq!(
            buffer.attributes[A_COLOR].data,
            AttributeData::U8([255, 0, 0, 255].repeat(4))
        );
        assert_eq!(
            buffer.attributes[A_OPACITY].data,
            AttributeData::U8(vec![127; 4])
        );
        assert_eq!(buffer.attributes[A_UV_SCALE].data.numeric_type(), NumericType::U8);
        assert!(buffer.is_consistent());
    }

    #[test]
    fn test_literals_stay_uniforms() {
        let symbol = fill_symbol(json!({"polygonFill": "#f00", "polygonOpacity": 0.3}));
        let feature = Feature::new(GeometryType::Polygon, vec![rectangle()]);

        let buffer = pack(&[feature], &symbol, &PackOptions::default()).unwrap();
        assert!(!buffer.has_attribute(A_COLOR));
        assert!(!buffer.has_attribute(A_OPACITY));
    }

    #[test]
    fn test_pattern_tex_info() {
        let atlas = IconAtlas {
            width: 512,
            height: 64,
            positions: BTreeMap::from([(
                "grass".to_owned(),
                IconPosition {
                    tl: [300.0, 10.0],
                    display_size: [32.0, 32.0],
                },
            )]),
        };
        let options = PackOptions {
            atlas: Some(atlas),
            ..PackOptions::default()
        };
        let symbol = fill_symbol(json!({
            "polygonPatternFile": {"property": "pattern", "type": "identity"},
            "uvScale": {"property": "size", "type": "identity"}
        }));
        let grass = Feature::new(GeometryType::Polygon, vec![rectangle()])
            .with_property("pattern", "grass")
            .with_property("size", 2.0);
        let unknown = Feature::new(GeometryType::Polygon, vec![rectangle()])
            .with_property("pattern", "sand");

        let buffer = pack(&[grass, unknown], &symbol, &options).unwrap();
        let tex_info = &buffer.attributes[A_TEX_INFO];
        assert_eq!(tex_info.data.numeric_type(), NumericType::U16);
        assert_eq!(tex_info.vertex(0), vec![301.0, 11.0, 29.0, 29.0]);
        assert_eq!(tex_info.vertex(4), vec![0.0; 4]);

        let uv_scale = &buffer.attributes[A_UV_SCALE];
        assert_eq!(uv_scale.data.numeric_type(), NumericType::U16);
        assert_eq!(uv_scale.vertex(0), vec![20.0, 20.0]);
    }

    #[test]
    fn test_clip_to_padded_extent() {
        let ring = vec![
            [-100.0, -100.0, 0.0],
            [200.0, -100.0, 0.0],
            [200.0, 200.0, 0.0],
            [-100.0, 200.0, 0.0],
        ];
        let feature = Feature::new(GeometryType::Polygon, vec![ring.clone()]).with_extent(100);
        let buffer = pack(&[feature], &FillSymbol::default(), &PackOptions::default()).unwrap();

        let AttributeData::I16(positions) = &buffer.attributes[A_POSITION].data else {
            panic!("expected i16 positions");
        };
        assert!(positions.iter().all(|c| (-1..=101).contains(c)));

        let no_clip = PackOptions {
            clip_to_tile: false,
            ..PackOptions::default()
        };
        let feature = Feature::new(GeometryType::Polygon, vec![ring]).with_extent(100);
        let buffer = pack(&[feature], &FillSymbol::default(), &no_clip).unwrap();
        assert_eq!(buffer.attributes[A_POSITION].vertex(0), vec![-100.0, -100.0, 0.0]);
    }

    #[test]
    fn test_vertical_wall() {
        let wall = vec![
            [0.0, 5.0, 0.0],
            [10.0, 5.0, 0.0],
            [10.0, 5.0, 8.0],
            [0.0, 5.0, 8.0],
        ];
        let feature = Feature::new(GeometryType::Polygon, vec![wall]).with_extent(4096);
        let buffer = pack(&[feature], &FillSymbol::default(), &PackOptions::default()).unwrap();
        assert!(buffer.triangle_count() >= 1);
    }

    #[test]
    fn test_malformed_feature_is_dropped() {
        let broken = Feature::new(
            GeometryType::Polygon,
            vec![vec![[0.0, 0.0, 0.0], [f64::INFINITY, 0.0, 0.0], [10.0, 10.0, 0.0]]],
        );
        let valid = Feature::new(GeometryType::Polygon, vec![rectangle()]);

        let buffer = pack(&[broken, valid], &FillSymbol::default(), &PackOptions::default()).unwrap();
        assert_eq!(buffer.vertex_count, 4);
        assert_eq!(buffer.attributes["aPickingId"].vertex(0), vec![1.0]);
    }

    #[test]
    fn test_repeated_packs_are_identical() {
        let symbol = fill_symbol(json!({"polygonFill": {"property": "kind", "stops": [["lake", "#00f"]]}}));
        let features = vec![
            Feature::new(GeometryType::Polygon, vec![rectangle()]).with_property("kind", "lake"),
            Feature::new(GeometryType::Polygon, vec![rectangle()]).with_property("kind", "park"),
        ];

        let first = pack(&features, &symbol, &PackOptions::default()).unwrap();
        let second = pack(&features, &symbol, &PackOptions::default()).unwrap();
        for (name, attribute) in &first.attributes {
            assert_eq!(attribute.data.as_bytes(), second.attributes[name].data.as_bytes());
        }
        assert_eq!(first.indices.as_bytes(), second.indices.as_bytes());
    }

    #[test]
    fn test_outline_edges() {
        let options = PackOptions {
            line_elements: true,
            ..PackOptions::default()
        };
        let feature = Feature::new(GeometryType::Polygon, vec![rectangle()]);
        let buffer = pack(&[feature], &FillSymbol::default(), &options).unwrap();
        assert_eq!(
            buffer.aux_indices[LINE_INDICES].to_vec(),
            vec![0, 1, 1, 2, 2, 3, 3, 0]
        );
    }
}
