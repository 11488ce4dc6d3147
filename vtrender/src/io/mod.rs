//! Handles IO related processing as well as multithreading.
//!
//! Tiles are packed off the render thread. The renderer hands a [`PackRequest`] to a
//! [`scheduler::PackScheduler`], which fetches the raw tile from a [`source_client::TileSource`],
//! runs [`pipeline::process_tile`] and hands back a [`PackMessage`] through a channel which the
//! renderer polls without blocking.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    coords::{WorldTileCoords, ZoomLevel},
    error::WorkerError,
    pack::PackedTileBuffer,
    style::PluginId,
    tile::Feature,
};

pub mod pipeline;
pub mod scheduler;
pub mod source_client;
pub mod tile_request_state;

/// The ID format for a tile request.
pub type TileRequestID = u32;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("scheduler is shut down")]
    ShutDown,
}

/// Tile addressed by a pack request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackTileInfo {
    pub x: i32,
    pub y: i32,
    pub z: u8,
    pub resolution: f64,
}

impl PackTileInfo {
    pub fn coords(&self) -> WorldTileCoords {
        WorldTileCoords::new(self.x, self.y, ZoomLevel::new(self.z))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackRequest {
    pub tile_info: PackTileInfo,
    /// Scale of the tile's zoom level at the camera zoom when the tile was requested. Packing
    /// works in tile units and does not read it, the renderer applies the scale of the current
    /// frame when it draws the tile.
    pub gl_scale: f64,
    pub z_scale: f64,
    /// Coordinate range packed positions are normalized to.
    pub extent: u32,
}

impl PackRequest {
    /// Zoom at which style functions are evaluated while packing.
    pub fn zoom(&self) -> f64 {
        self.tile_info.z as f64
    }
}

/// Packed geometry of one style rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolGeometry {
    /// Index of the rule within its plugin.
    pub symbol_index: usize,
    pub buffer: PackedTileBuffer,
}

/// Everything one plugin draws of a tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginBuffer {
    pub plugin_id: PluginId,
    pub geometries: Vec<SymbolGeometry>,
    /// Indexed by picking id, holds the index of the feature in [`PackResponse::features`].
    pub styled_features: Vec<u32>,
    /// Patterns which are missing from the icon atlas.
    #[serde(default)]
    pub icon_requests: BTreeSet<String>,
}

/// A feature as it is reported by picking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileFeature {
    pub layer: String,
    #[serde(flatten)]
    pub feature: Feature,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackResponse {
    /// One entry per plugin in style order, `None` when a plugin draws nothing of the tile.
    pub per_plugin_buffers: Vec<Option<PluginBuffer>>,
    /// JSON list of [`TileFeature`]s referenced by the plugin buffers.
    pub features: String,
}

impl PackResponse {
    pub fn decode_features(&self) -> Result<Vec<TileFeature>, serde_json::Error> {
        serde_json::from_str(&self.features)
    }
}

/// Result of a pack request as it arrives on the render thread.
#[derive(Debug)]
pub struct PackMessage {
    pub request_id: TileRequestID,
    pub coords: WorldTileCoords,
    pub result: Result<PackResponse, WorkerError>,
}
