//! Resolves the overlap of tiles from different zoom levels.
//!
//! Before any color is drawn, every visible tile writes its own id over its whole quad, in draw
//! order. A tile drawn later overwrites the ids of tiles below it, so the color pass, which only
//! passes where the stencil equals the tile's id, shows each pixel from exactly one tile.

use std::collections::HashMap;

use crate::{
    coords::{DupKey, TileInfo, Zoom},
    render::backend::{
        BackendError, DrawCommand, DrawGeometry, FrameUniforms, GpuBackend, RenderTarget, Shading,
        StencilTest,
    },
};

/// Ids available per frame. 0 marks pixels no tile covers and 255 is left unused.
pub const MAX_STENCIL_REF: u32 = 254;

/// Stencil ids of the current frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    refs: HashMap<DupKey, u32>,
    next: u32,
    warned: bool,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameContext {
    pub fn new() -> Self {
        Self {
            refs: HashMap::new(),
            next: 1,
            warned: false,
        }
    }

    /// Assigns the next id to `key`. Returns the existing id when the tile already has one and
    /// `None` once the ids of this frame are exhausted.
    pub fn assign(&mut self, key: DupKey) -> Option<u32> {
        if let Some(reference) = self.refs.get(&key) {
            return Some(*reference);
        }
        if self.next > MAX_STENCIL_REF {
            if !self.warned {
                log::warn!("stencil ids exhausted, tiles from {key} on are drawn without overlap resolution");
                self.warned = true;
            }
            return None;
        }

        let reference = self.next;
        self.next += 1;
        self.refs.insert(key, reference);
        Some(reference)
    }

    pub fn stencil_ref(&self, key: &DupKey) -> Option<u32> {
        self.refs.get(key).copied()
    }

    /// Number of ids handed out.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Stencil state for the color pass of a tile. Tiles without an id are not gated.
    pub fn color_test(&self, key: &DupKey) -> Option<StencilTest> {
        self.stencil_ref(key).map(StencilTest::equal)
    }
}

pub struct StencilOverlapResolver;

impl StencilOverlapResolver {
    /// Assigns ids to `tiles`, which must be in draw order.
    pub fn resolve<'a>(tiles: impl IntoIterator<Item = &'a TileInfo>) -> FrameContext {
        let mut context = FrameContext::new();
        for tile in tiles {
            context.assign(tile.dup_key);
        }
        context
    }

    /// Writes the id of every tile over its quad. Color is not written.
    pub fn mask_pass<'a>(
        backend: &mut dyn GpuBackend,
        target: RenderTarget,
        frame: &FrameUniforms,
        context: &FrameContext,
        tiles: impl IntoIterator<Item = &'a TileInfo>,
        tile_size: f64,
        extent: f64,
    ) -> Result<(), BackendError> {
        let gl_zoom = Zoom::new(frame.gl_zoom);
        for tile in tiles {
            let Some(reference) = context.stencil_ref(&tile.dup_key) else {
                continue;
            };
            backend.submit_draw(&DrawCommand {
                target,
                geometry: DrawGeometry::TileQuad {
                    transform: tile.tile_transform(gl_zoom, frame.z_scale, tile_size, extent),
                    extent,
                },
                frame,
                stencil: Some(StencilTest::mask(reference)),
                color_write: false,
                shading: Shading::Color,
            })?;
        }
        Ok(())
    }
}
