//! Per-frame input and output of the renderer.

use cgmath::Matrix4;

use crate::{
    coords::{TileInfo, Zoom},
    render::backend::FrameUniforms,
};

/// Tiles of a frame, grouped the way they are drawn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleTiles {
    /// Ancestors standing in for tiles which are not loaded yet.
    pub parents: Vec<TileInfo>,
    /// Descendants standing in for tiles which are not loaded yet.
    pub children: Vec<TileInfo>,
    /// Tiles at the current zoom level.
    pub tiles: Vec<TileInfo>,
}

impl VisibleTiles {
    pub fn new(tiles: Vec<TileInfo>) -> Self {
        Self {
            tiles,
            ..Self::default()
        }
    }

    /// Parents first, then children, then the tiles of the current level.
    pub fn draw_order(&self) -> impl Iterator<Item = &TileInfo> {
        self.parents
            .iter()
            .chain(self.children.iter())
            .chain(self.tiles.iter())
    }

    pub fn len(&self) -> usize {
        self.parents.len() + self.children.len() + self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Camera state and visible tiles of a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameView {
    pub visible: VisibleTiles,
    /// Point space of `gl_zoom` to clip space.
    pub proj_view: Matrix4<f64>,
    pub gl_zoom: Zoom,
    pub z_scale: f64,
    /// The map is being dragged or zoomed.
    pub interacting: bool,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: f64,
}

impl FrameView {
    /// A top-down view which shows points `[0, width] x [0, height]` of `gl_zoom` one to one.
    pub fn top_down(visible: VisibleTiles, gl_zoom: f64, width: u32, height: u32) -> Self {
        Self {
            visible,
            proj_view: cgmath::ortho(0.0, width as f64, height as f64, 0.0, -1.0, 1.0),
            gl_zoom: Zoom::new(gl_zoom),
            z_scale: 1.0,
            interacting: false,
            width,
            height,
            timestamp_ms: 0.0,
        }
    }

    pub fn uniforms(&self) -> FrameUniforms {
        FrameUniforms {
            proj_view: self.proj_view,
            viewport: [self.width, self.height],
            gl_zoom: self.gl_zoom.value(),
            z_scale: self.z_scale,
        }
    }
}

/// What a rendered frame left behind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStatus {
    /// Another frame is needed, because tiles are fading in or still loading.
    pub redraw: bool,
    pub drawn_tiles: usize,
    pub pending_tiles: usize,
}

#[cfg(test)]
mod tests {
    use cgmath::Vector4;

    use crate::{
        coords::{TileInfo, WorldTileCoords, TILE_SIZE},
        render::frame::{FrameView, VisibleTiles},
    };

    #[test]
    fn test_draw_order() {
        let tile = |z| TileInfo::from_grid(WorldTileCoords::new(0, 0, z), TILE_SIZE, 1.0);
        let visible = VisibleTiles {
            parents: vec![tile(1)],
            children: vec![tile(3)],
            tiles: vec![tile(2)],
        };

        let levels: Vec<u8> = visible.draw_order().map(|tile| tile.coords.z.into()).collect();
        assert_eq!(levels, vec![1, 3, 2]);
        assert_eq!(visible.len(), 3);
    }

    #[test]
    fn test_top_down_projection() {
        let view = FrameView::top_down(VisibleTiles::default(), 0.0, 100, 50);

        let top_left = view.proj_view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = view.proj_view * Vector4::new(100.0, 50.0, 0.0, 1.0);
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(top_left.x, -1.0) && close(top_left.y, 1.0));
        assert!(close(bottom_right.x, 1.0) && close(bottom_right.y, -1.0));
    }
}
