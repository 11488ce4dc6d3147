//! Settings for the renderer

use serde::{Deserialize, Serialize};

use crate::{
    coords::{EXTENT_UINT, TILE_SIZE},
    pack::PackOptions,
};

/// Provides configuration for the renderer and for the packing of its tiles.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererSettings {
    /// Resolve tile overlap with the stencil buffer. Without it overlapping tiles blend.
    pub stencil: bool,
    /// Keep an offscreen target for picking.
    pub picking: bool,
    /// Displayed size of a tile, in points.
    pub tile_size: f64,
    /// Coordinate range tiles are packed to.
    pub extent: u32,
    pub pack: PackOptions,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            stencil: true,
            picking: true,
            tile_size: TILE_SIZE,
            extent: EXTENT_UINT,
            pack: PackOptions::default(),
        }
    }
}

impl RendererSettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
