//! Provides utilities related to coordinates.

use std::fmt::{self, Display, Formatter};

use cgmath::{Matrix4, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::util::Tolerance;

pub const EXTENT_UINT: u32 = 4096;
pub const EXTENT: f64 = EXTENT_UINT as f64;
pub const TILE_SIZE: f64 = 512.0;

/// Discrete zoom level of a tile pyramid.
#[derive(
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    Copy,
    Clone,
    Debug,
    Default,
    Serialize,
    Deserialize,
)]
pub struct ZoomLevel(u8);

impl ZoomLevel {
    pub const fn new(z: u8) -> Self {
        ZoomLevel(z)
    }
}

impl Display for ZoomLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ZoomLevel {
    fn from(zoom_level: u8) -> Self {
        ZoomLevel(zoom_level)
    }
}

impl From<ZoomLevel> for u8 {
    fn from(val: ZoomLevel) -> Self {
        val.0
    }
}

/// Continuous zoom of the camera.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Zoom(f64);

impl Zoom {
    pub fn new(zoom: f64) -> Self {
        Zoom(zoom)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Power-of-two factor which scales coordinates of zoom level `z` into the space of this zoom.
    pub fn scale_from_level(&self, z: ZoomLevel) -> f64 {
        2.0_f64.powf(self.0 - z.0 as f64)
    }
}

impl Display for Zoom {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Tolerance for Zoom {
    type Epsilon = f64;

    fn differs(&self, other: &Self, epsilon: f64) -> bool {
        (self.0 - other.0).abs() > epsilon
    }
}

/// Every tile has tile coordinates. Unlike addressing schemes of tile servers, these coordinates
/// may exceed the world bounds horizontally when the world is repeated.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct WorldTileCoords {
    pub x: i32,
    pub y: i32,
    pub z: ZoomLevel,
}

impl WorldTileCoords {
    pub fn new(x: i32, y: i32, z: impl Into<ZoomLevel>) -> Self {
        Self { x, y, z: z.into() }
    }

    /// Index of the world copy this tile lies in, 0 for the primary world.
    pub fn wrap(&self) -> i32 {
        let tiles = 1i64 << u8::from(self.z);
        (self.x as i64).div_euclid(tiles) as i32
    }
}

impl Display for WorldTileCoords {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "T(x={x},y={y},z={z})", x = self.x, y = self.y, z = self.z)
    }
}

/// Distinguishes tile instances which cover the same screen footprint at different pyramid
/// levels, as well as repeated copies of the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DupKey {
    pub coords: WorldTileCoords,
    pub wrap: i32,
}

impl From<WorldTileCoords> for DupKey {
    fn from(coords: WorldTileCoords) -> Self {
        DupKey {
            coords,
            wrap: coords.wrap(),
        }
    }
}

impl Display for DupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.coords, self.wrap)
    }
}

/// A tile as it is laid out for drawing in the current view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileInfo {
    pub coords: WorldTileCoords,
    /// Map units per pixel at the tile's zoom level.
    pub resolution: f64,
    pub dup_key: DupKey,
    /// Origin of the tile in point space of its own zoom level.
    pub point: Point2<f64>,
}

impl TileInfo {
    pub fn new(coords: WorldTileCoords, resolution: f64, point: Point2<f64>) -> Self {
        Self {
            coords,
            resolution,
            dup_key: DupKey::from(coords),
            point,
        }
    }

    /// Lays the tile out on a regular grid of `tile_size` points at its zoom level.
    pub fn from_grid(coords: WorldTileCoords, tile_size: f64, max_resolution: f64) -> Self {
        let resolution = max_resolution / 2.0_f64.powi(u8::from(coords.z) as i32);
        let point = Point2::new(coords.x as f64 * tile_size, coords.y as f64 * tile_size);
        Self::new(coords, resolution, point)
    }

    /// Model transform of tile-local coordinates into the point space of `gl_zoom`.
    ///
    /// The order is significant: scale by the zoom delta, translate to the tile origin, then
    /// normalize the source extent to the displayed tile size.
    pub fn tile_transform(
        &self,
        gl_zoom: Zoom,
        z_scale: f64,
        tile_size: f64,
        extent: f64,
    ) -> Matrix4<f64> {
        let gl_scale = gl_zoom.scale_from_level(self.coords.z);
        let tile_ratio = tile_size / extent;

        Matrix4::from_nonuniform_scale(gl_scale, gl_scale, z_scale)
            * Matrix4::from_translation(Vector3::new(self.point.x, self.point.y, 0.0))
            * Matrix4::from_nonuniform_scale(tile_ratio, tile_ratio, 1.0)
    }
}
