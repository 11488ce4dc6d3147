//! Resolved style of a vector tile layer.
//!
//! A style is an ordered list of plugin configurations. Each plugin names its kind and carries
//! rules, pairs of a feature filter and a symbol. The list is resolved once into [`Style`] so
//! that no plugin lookup happens while drawing.

use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    style::{
        filter::Filter,
        symbol::{FillSymbol, LineSymbol, Symbol},
    },
    tile::{Feature, GeometryType},
};

pub mod filter;
pub mod function;
pub mod symbol;

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("plugin at index {index} has no type")]
    MissingPluginType { index: usize },
    #[error("unknown plugin type `{plugin_type}` at index {index}")]
    UnknownPluginType { index: usize, plugin_type: String },
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid symbol of plugin at index {index}")]
    InvalidSymbol {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid style document")]
    Document(#[from] serde_json::Error),
}

/// The closed set of plugin kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginKind {
    Fill,
    Line,
}

impl PluginKind {
    /// Geometry the plugin draws. Other features are skipped while packing.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            PluginKind::Fill => GeometryType::Polygon,
            PluginKind::Line => GeometryType::LineString,
        }
    }
}

impl FromStr for PluginKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fill" => Ok(PluginKind::Fill),
            "line" => Ok(PluginKind::Line),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Fill => write!(f, "fill"),
            PluginKind::Line => write!(f, "line"),
        }
    }
}

static NEXT_PLUGIN_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a plugin instance for its whole lifetime, independently of its position in the
/// style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PluginId(u64);

impl PluginId {
    pub fn next() -> Self {
        PluginId(NEXT_PLUGIN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin#{}", self.0)
    }
}

/// Per-plugin scene settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneConfig {
    /// Duration of the fade-in of newly loaded tiles. Zero disables fading.
    #[serde(default)]
    pub fade_duration_ms: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StyleRuleConfig {
    #[serde(default)]
    pub filter: serde_json::Value,
    #[serde(default = "empty_symbol")]
    pub symbol: serde_json::Value,
}

fn empty_symbol() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Plugin configuration as delivered by the style provider.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    #[serde(rename = "type", default)]
    pub plugin_type: Option<String>,
    #[serde(default)]
    pub style: Vec<StyleRuleConfig>,
    #[serde(default)]
    pub scene_config: SceneConfig,
}

#[derive(Debug, Clone)]
pub struct StyleRule {
    pub filter: Filter,
    pub symbol: Symbol,
}

#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub id: PluginId,
    pub kind: PluginKind,
    pub rules: Vec<StyleRule>,
    pub scene_config: SceneConfig,
}

impl ResolvedPlugin {
    fn resolve(index: usize, config: PluginConfig) -> Result<Self, StyleError> {
        let plugin_type = config
            .plugin_type
            .ok_or(StyleError::MissingPluginType { index })?;
        let kind = PluginKind::from_str(&plugin_type).map_err(|_| {
            StyleError::UnknownPluginType {
                index,
                plugin_type: plugin_type.clone(),
            }
        })?;

        let rules = config
            .style
            .into_iter()
            .map(|rule| {
                let filter = Filter::parse(&rule.filter)?;
                let symbol = match kind {
                    PluginKind::Fill => Symbol::Fill(
                        serde_json::from_value::<FillSymbol>(rule.symbol)
                            .map_err(|source| StyleError::InvalidSymbol { index, source })?,
                    ),
                    PluginKind::Line => Symbol::Line(
                        serde_json::from_value::<LineSymbol>(rule.symbol)
                            .map_err(|source| StyleError::InvalidSymbol { index, source })?,
                    ),
                };
                Ok(StyleRule { filter, symbol })
            })
            .collect::<Result<Vec<_>, StyleError>>()?;

        Ok(ResolvedPlugin {
            id: PluginId::next(),
            kind,
            rules,
            scene_config: config.scene_config,
        })
    }

    /// Index of the first rule matching the feature.
    pub fn match_rule(&self, layer: &str, feature: &Feature) -> Option<usize> {
        if feature.geometry_type != self.kind.geometry_type() {
            return None;
        }
        self.rules
            .iter()
            .position(|rule| rule.filter.matches(layer, feature))
    }
}

/// Ordered list of plugins. The position of a plugin is its style-layer index.
#[derive(Debug, Clone, Default)]
pub struct Style {
    pub plugins: Vec<ResolvedPlugin>,
}

impl Style {
    /// Resolves plugin configurations. Fails fast on the first unknown plugin type.
    pub fn from_configs(configs: Vec<PluginConfig>) -> Result<Self, StyleError> {
        let plugins = configs
            .into_iter()
            .enumerate()
            .map(|(index, config)| ResolvedPlugin::resolve(index, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Style { plugins })
    }

    pub fn from_json(json: &str) -> Result<Self, StyleError> {
        let configs: Vec<PluginConfig> = serde_json::from_str(json)?;
        Self::from_configs(configs)
    }
}
