//! Symbols of the supported plugin kinds.

use serde::{Deserialize, Serialize};

use crate::style::function::{PropertyKind, StyleProperty};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FillSymbol {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon_fill: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon_opacity: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon_pattern_file: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_scale: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uv_offset: Option<StyleProperty>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineSymbol {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_color: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_opacity: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_gap_width: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_blur: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_dx: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_dy: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_dasharray: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_dash_color: Option<StyleProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_pattern_file: Option<StyleProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Fill(FillSymbol),
    Line(LineSymbol),
}

/// True when the property is a per-feature function and therefore packed as an attribute.
pub fn is_feature_function(property: &Option<StyleProperty>) -> bool {
    property
        .as_ref()
        .map_or(false, |property| property.kind() == PropertyKind::FeatureFunction)
}
