//! Features of vector tiles as they are consumed by the packer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::util::math::TilePoint;

pub mod tile_parser;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
}

impl GeometryType {
    /// Name used by the `$type` filter pseudo-property.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Bool(value) => serde_json::Value::Bool(*value),
            PropertyValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropertyValue::String(value) => serde_json::Value::String(value.clone()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// A single feature of a tile. Coordinates are tile-local, `z` carries an altitude when the
/// source provides one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: Option<u64>,
    pub geometry_type: GeometryType,
    /// Rings of a polygon, parts of a line or groups of points.
    pub geometry: Vec<Vec<TilePoint>>,
    pub properties: Properties,
    /// Coordinate range of the source, `None` when the source is not tiled.
    pub extent: Option<u32>,
}

impl Feature {
    pub fn new(geometry_type: GeometryType, geometry: Vec<Vec<TilePoint>>) -> Self {
        Self {
            id: None,
            geometry_type,
            geometry,
            properties: Properties::new(),
            extent: None,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_owned(), value.into());
        self
    }

    pub fn has_altitude(&self) -> bool {
        self.geometry
            .iter()
            .flatten()
            .any(|point| point[2] != 0.0)
    }
}

/// A named layer of features within one tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceLayer {
    pub name: String,
    pub extent: Option<u32>,
    pub features: Vec<Feature>,
}

/// Raw tile data as delivered by a tile source.
#[derive(Clone, Debug)]
pub enum RawTile {
    /// Protobuf encoded Mapbox vector tile.
    Mvt(Vec<u8>),
    /// Layers which are already decoded, e.g. from GeoJSON.
    Layers(Vec<SourceLayer>),
}
