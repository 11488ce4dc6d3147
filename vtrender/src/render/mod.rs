//! This module implements the rendering algorithm of vtrender. It drives packing, turns packed
//! tiles into meshes and composites them frame by frame.
//!
//! A tile moves through the states `Requested`, `Decoded` and `Rendered`. Packing happens on the
//! [`PackScheduler`] and the renderer never waits for it: tiles which are not packed yet are
//! skipped for the frame. Tiles whose packing failed are kept as `Empty` for one frame and then
//! requested again.

use std::{collections::HashMap, sync::Arc};

use cgmath::Matrix4;

use crate::{
    coords::{TileInfo, WorldTileCoords, Zoom},
    error::Error,
    io::{
        scheduler::{PackScheduler, PackTask},
        tile_request_state::TileRequestState,
        PackRequest, PackResponse, PackTileInfo, TileFeature,
    },
    pack::PackOptions,
    render::{
        backend::{FrameUniforms, GpuBackend, RenderTarget, TargetId},
        frame::{FrameStatus, FrameView},
        painter::{PaintContext, Painter, PluginPainter, PluginTile, SceneCache, TileDraw},
        picking::{decode_id, PickResult, PickingTable, NO_HIT},
        settings::RendererSettings,
        stencil::{FrameContext, StencilOverlapResolver},
    },
    style::{PluginId, SceneConfig, Style},
};

pub mod backend;
pub mod frame;
pub mod headless;
pub mod mesh;
pub mod painter;
pub mod picking;
pub mod settings;
pub mod stencil;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

enum TileState {
    Requested,
    Decoded {
        response: PackResponse,
        loaded_at_ms: f64,
    },
    Rendered {
        /// Indexed by style layer.
        plugins: Vec<Option<PluginTile>>,
        features: String,
        loaded_at_ms: f64,
    },
    /// Packing failed, requested again on the next frame.
    Empty,
}

/// What the previous frame drew, needed to run a picking pass for it.
struct DrawnFrame {
    uniforms: FrameUniforms,
    tiles: Vec<TileInfo>,
    timestamp_ms: f64,
}

pub struct VectorTileRenderer<S: PackScheduler> {
    settings: RendererSettings,
    style: Arc<Style>,
    pack_options: Arc<PackOptions>,
    painters: Vec<PluginPainter>,
    caches: HashMap<PluginId, SceneCache>,
    tiles: HashMap<WorldTileCoords, TileState>,
    requests: TileRequestState,
    scheduler: S,
    picking_target: Option<TargetId>,
    size: [u32; 2],
    drawn: Option<DrawnFrame>,
    removed: bool,
}

impl<S: PackScheduler> VectorTileRenderer<S> {
    pub fn new(style: Style, settings: RendererSettings, scheduler: S) -> Self {
        let pack_options = Arc::new(settings.pack.clone());
        let mut renderer = Self {
            settings,
            style: Arc::new(Style::default()),
            pack_options,
            painters: Vec::new(),
            caches: HashMap::new(),
            tiles: HashMap::new(),
            requests: TileRequestState::new(),
            scheduler,
            picking_target: None,
            size: [0, 0],
            drawn: None,
            removed: false,
        };
        renderer.set_style(style);
        renderer
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Replaces the style. In-flight requests are cancelled and all tiles are packed again.
    pub fn set_style(&mut self, style: Style) {
        self.requests.cancel_all();
        self.tiles.clear();
        self.drawn = None;

        self.painters = style
            .plugins
            .iter()
            .map(|plugin| {
                let mut painter = PluginPainter::new(plugin.clone());
                let [width, height] = self.size;
                painter.as_painter_mut().resize(width, height);
                painter
            })
            .collect();
        self.caches = style
            .plugins
            .iter()
            .map(|plugin| (plugin.id, SceneCache::new(&plugin.scene_config)))
            .collect();
        self.style = Arc::new(style);

        log::info!("style set with {} plugins", self.painters.len());
    }

    /// Evicts a tile and cancels its request.
    pub fn remove_tile(&mut self, coords: &WorldTileCoords) {
        self.requests.cancel_tile_request(coords);
        self.tiles.remove(coords);
    }

    pub fn resize(
        &mut self,
        backend: &mut dyn GpuBackend,
        width: u32,
        height: u32,
    ) -> Result<(), Error> {
        self.size = [width, height];
        for painter in &mut self.painters {
            painter.as_painter_mut().resize(width, height);
        }
        if let Some(target) = self.picking_target {
            backend.resize_render_target(RenderTarget::Offscreen(target), width, height)?;
        }
        Ok(())
    }

    /// Tears the renderer down. Nothing is drawn or packed afterwards.
    pub fn remove(&mut self, backend: &mut dyn GpuBackend) {
        self.requests.cancel_all();
        self.scheduler.shutdown();
        for painter in &mut self.painters {
            painter.as_painter_mut().remove();
        }
        if let Some(target) = self.picking_target.take() {
            backend.destroy_render_target(target);
        }
        self.tiles.clear();
        self.caches.clear();
        self.drawn = None;
        self.removed = true;
    }

    /// Returns false when no plugin has the id.
    pub fn update_scene_config(&mut self, plugin: PluginId, config: &SceneConfig) -> bool {
        match self.caches.get_mut(&plugin) {
            Some(cache) => {
                cache.fade_duration_ms = config.fade_duration_ms;
                cache.zoom.invalidate();
                true
            }
            None => false,
        }
    }

    /// Whether the view needs a new frame. Always true while the user interacts with the map.
    pub fn need_to_redraw(&mut self, view: &FrameView) -> bool {
        if self.removed {
            return false;
        }
        if view.interacting {
            return true;
        }
        if view
            .visible
            .draw_order()
            .any(|info| matches!(self.tiles.get(&info.coords), Some(TileState::Decoded { .. })))
        {
            return true;
        }

        let mut redraw = false;
        for painter in &self.painters {
            let painter = painter.as_painter();
            if let Some(cache) = self.caches.get_mut(&painter.plugin_id()) {
                *cache.zoom = view.gl_zoom;
                redraw |= painter.need_to_redraw(cache);
            }
        }
        redraw
    }

    /// Collects finished pack tasks without waiting for unfinished ones.
    fn receive_packed_tiles(&mut self, timestamp_ms: f64) {
        while let Some(message) = self.scheduler.receive() {
            let coords = message.coords;
            if self.requests.finish_tile_request(message.request_id).is_none() {
                log::debug!("discarding result of cancelled request for {coords}");
                continue;
            }

            let state = match message.result {
                Ok(response) => TileState::Decoded {
                    response,
                    loaded_at_ms: timestamp_ms,
                },
                Err(e) => {
                    log::warn!("packing tile {coords} failed: {e}");
                    TileState::Empty
                }
            };
            self.tiles.insert(coords, state);
        }
    }

    fn request_tile(&mut self, info: &TileInfo, view: &FrameView) -> Result<(), Error> {
        let coords = info.coords;
        let Some((request_id, token)) = self.requests.start_tile_request(coords) else {
            return Ok(());
        };
        log::debug!("tile {coords} requested");

        let request = PackRequest {
            tile_info: PackTileInfo {
                x: coords.x,
                y: coords.y,
                z: coords.z.into(),
                resolution: info.resolution,
            },
            gl_scale: view.gl_zoom.scale_from_level(coords.z),
            z_scale: view.z_scale,
            extent: self.settings.extent,
        };
        let task = PackTask {
            request_id,
            request,
            style: self.style.clone(),
            options: self.pack_options.clone(),
            token,
        };
        if let Err(e) = self.scheduler.schedule(task) {
            self.requests.cancel_tile_request(&coords);
            return Err(e.into());
        }
        self.tiles.insert(coords, TileState::Requested);
        Ok(())
    }

    /// Requests missing tiles and builds the meshes of tiles packed since the last frame.
    ///
    /// Packed tiles which left the view before their meshes were built are evicted, they are
    /// requested again once they become visible.
    fn update_tiles(&mut self, view: &FrameView) -> Result<(), Error> {
        for info in view.visible.draw_order() {
            match self.tiles.get(&info.coords) {
                None => self.request_tile(info, view)?,
                Some(TileState::Decoded { .. }) => self.build_meshes(info, view),
                Some(_) => {}
            }
        }

        let before = self.tiles.len();
        self.tiles
            .retain(|_, state| !matches!(state, TileState::Decoded { .. }));
        let evicted = before - self.tiles.len();
        if evicted > 0 {
            log::debug!("evicted {evicted} packed tiles which left the view");
        }
        Ok(())
    }

    fn build_meshes(&mut self, info: &TileInfo, view: &FrameView) {
        let Some(TileState::Decoded {
            response,
            loaded_at_ms,
        }) = self.tiles.remove(&info.coords)
        else {
            return;
        };

        let transform = self.tile_transform(info, view);
        let plugins = response
            .per_plugin_buffers
            .iter()
            .enumerate()
            .map(|(style_layer, buffer)| {
                let buffer = buffer.as_ref()?;
                let painter = self.painters.get(style_layer)?;
                if painter.as_painter().plugin_id() != buffer.plugin_id {
                    return None;
                }
                Some(painter.create_tile(buffer, transform))
            })
            .collect();

        self.tiles.insert(
            info.coords,
            TileState::Rendered {
                plugins,
                features: response.features,
                loaded_at_ms,
            },
        );
    }

    fn tile_transform(&self, info: &TileInfo, view: &FrameView) -> Matrix4<f64> {
        info.tile_transform(
            view.gl_zoom,
            view.z_scale,
            self.settings.tile_size,
            self.settings.extent as f64,
        )
    }

    /// Stencil ids for `tiles`, empty when overlap resolution is disabled.
    fn frame_context(&self, tiles: &[TileInfo]) -> FrameContext {
        if self.settings.stencil {
            StencilOverlapResolver::resolve(tiles)
        } else {
            FrameContext::new()
        }
    }

    /// Draws a frame.
    #[tracing::instrument(skip_all)]
    pub fn render_frame(
        &mut self,
        backend: &mut dyn GpuBackend,
        view: &FrameView,
    ) -> Result<FrameStatus, Error> {
        if self.removed {
            return Ok(FrameStatus::default());
        }
        let started = instant::Instant::now();

        self.tiles
            .retain(|_, state| !matches!(state, TileState::Empty));
        self.receive_packed_tiles(view.timestamp_ms);
        self.update_tiles(view)?;

        let pending_tiles = view
            .visible
            .draw_order()
            .filter(|info| matches!(self.tiles.get(&info.coords), Some(TileState::Requested)))
            .count();
        for cache in self.caches.values_mut() {
            cache.pending_tiles = pending_tiles;
        }

        let drawable: Vec<TileInfo> = view
            .visible
            .draw_order()
            .filter(|info| matches!(self.tiles.get(&info.coords), Some(TileState::Rendered { .. })))
            .copied()
            .collect();

        let uniforms = view.uniforms();
        let target = RenderTarget::Screen;
        backend.clear(target, Some(CLEAR_COLOR), Some(0))?;

        let context = self.frame_context(&drawable);
        StencilOverlapResolver::mask_pass(
            backend,
            target,
            &uniforms,
            &context,
            &drawable,
            self.settings.tile_size,
            self.settings.extent as f64,
        )?;

        for painter in &mut self.painters {
            let painter = painter.as_painter_mut();
            if let Some(cache) = self.caches.get_mut(&painter.plugin_id()) {
                painter.start_frame(cache, view);
            }
        }

        let mut paint_context = PaintContext {
            backend,
            target,
            frame: &uniforms,
            timestamp_ms: view.timestamp_ms,
        };
        for (style_layer, painter) in self.painters.iter().enumerate() {
            let painter = painter.as_painter();
            if painter.is_removed() {
                continue;
            }
            let Some(cache) = self.caches.get_mut(&painter.plugin_id()) else {
                continue;
            };

            for info in &drawable {
                let transform = info.tile_transform(
                    view.gl_zoom,
                    view.z_scale,
                    self.settings.tile_size,
                    self.settings.extent as f64,
                );
                let Some(TileState::Rendered {
                    plugins,
                    loaded_at_ms,
                    ..
                }) = self.tiles.get_mut(&info.coords)
                else {
                    continue;
                };
                let Some(Some(tile)) = plugins.get_mut(style_layer) else {
                    continue;
                };

                let draw = TileDraw {
                    info,
                    transform,
                    stencil: context.color_test(&info.dup_key),
                    loaded_at_ms: *loaded_at_ms,
                };
                painter.paint_tile(&mut paint_context, cache, tile, &draw)?;
            }
        }

        let mut redraw = pending_tiles > 0;
        for painter in &mut self.painters {
            let painter = painter.as_painter_mut();
            if let Some(cache) = self.caches.get_mut(&painter.plugin_id()) {
                redraw |= painter.end_frame(cache);
            }
        }

        log::trace!(
            "frame drawn: {} tiles, {} pending, {:?}",
            drawable.len(),
            pending_tiles,
            started.elapsed()
        );

        let drawn_tiles = drawable.len();
        self.drawn = Some(DrawnFrame {
            uniforms,
            tiles: drawable,
            timestamp_ms: view.timestamp_ms,
        });

        Ok(FrameStatus {
            redraw,
            drawn_tiles,
            pending_tiles: self.requests.pending_count(),
        })
    }

    /// Draws the picking ids of the last frame into the picking target.
    fn picking_pass(&mut self, backend: &mut dyn GpuBackend) -> Result<Option<PickingTable>, Error> {
        if !self.settings.picking {
            return Ok(None);
        }
        let Some(drawn) = &self.drawn else {
            return Ok(None);
        };

        let target_id = match self.picking_target {
            Some(target) => target,
            None => {
                let [width, height] = drawn.uniforms.viewport;
                let target = backend.create_render_target(width, height);
                self.picking_target = Some(target);
                target
            }
        };
        let target = RenderTarget::Offscreen(target_id);
        backend.clear(target, Some([0.0; 4]), Some(0))?;

        let context = self.frame_context(&drawn.tiles);
        StencilOverlapResolver::mask_pass(
            backend,
            target,
            &drawn.uniforms,
            &context,
            &drawn.tiles,
            self.settings.tile_size,
            self.settings.extent as f64,
        )?;

        let mut table = PickingTable::new();
        let mut paint_context = PaintContext {
            backend,
            target,
            frame: &drawn.uniforms,
            timestamp_ms: drawn.timestamp_ms,
        };
        let gl_zoom = Zoom::new(drawn.uniforms.gl_zoom);
        for (style_layer, painter) in self.painters.iter().enumerate() {
            let painter = painter.as_painter();
            if painter.is_removed() {
                continue;
            }
            for info in &drawn.tiles {
                let Some(TileState::Rendered { plugins, .. }) = self.tiles.get_mut(&info.coords)
                else {
                    continue;
                };
                let Some(Some(tile)) = plugins.get_mut(style_layer) else {
                    continue;
                };

                let base_id = table.reserve(
                    style_layer,
                    tile.plugin_id,
                    info.coords,
                    tile.styled_features.len() as u32,
                );
                let draw = TileDraw {
                    info,
                    transform: info.tile_transform(
                        gl_zoom,
                        drawn.uniforms.z_scale,
                        self.settings.tile_size,
                        self.settings.extent as f64,
                    ),
                    stencil: context.color_test(&info.dup_key),
                    loaded_at_ms: 0.0,
                };
                painter.pick(&mut paint_context, tile, &draw, base_id)?;
            }
        }
        Ok(Some(table))
    }

    fn read_id(&self, backend: &dyn GpuBackend, x: u32, y: u32) -> Result<Option<u32>, Error> {
        let (Some(target), Some(drawn)) = (self.picking_target, &self.drawn) else {
            return Ok(None);
        };
        let [width, height] = drawn.uniforms.viewport;
        if x >= width || y >= height {
            return Ok(None);
        }
        let pixel = backend.read_pixels(RenderTarget::Offscreen(target), x, y, 1, 1)?;
        Ok(decode_id(&pixel))
    }

    /// The feature drawn at pixel `(x, y)` of the last frame.
    #[tracing::instrument(skip_all)]
    pub fn pick(
        &mut self,
        backend: &mut dyn GpuBackend,
        x: u32,
        y: u32,
    ) -> Result<Option<PickResult>, Error> {
        let Some(table) = self.picking_pass(backend)? else {
            return Ok(None);
        };
        let Some(id) = self.read_id(backend, x, y)? else {
            return Ok(None);
        };
        let Some((style_layer, plugin, coords, picking_id)) = table.lookup(id) else {
            return Ok(None);
        };

        let feature = match self.tiles.get(&coords) {
            Some(TileState::Rendered {
                plugins, features, ..
            }) => {
                let index = plugins
                    .get(style_layer)
                    .and_then(Option::as_ref)
                    .and_then(|tile| tile.styled_features.get(picking_id as usize))
                    .copied();
                match (index, serde_json::from_str::<Vec<TileFeature>>(features)) {
                    (Some(index), Ok(mut features)) if (index as usize) < features.len() => {
                        Some(features.swap_remove(index as usize))
                    }
                    (_, Err(e)) => {
                        log::warn!("features of tile {coords} do not decode: {e}");
                        None
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        Ok(Some(PickResult {
            style_layer,
            plugin,
            coords,
            picking_id,
            feature,
        }))
    }

    /// Whether any feature was drawn at pixel `(x, y)` of the last frame.
    pub fn hit_detect(
        &mut self,
        backend: &mut dyn GpuBackend,
        x: u32,
        y: u32,
    ) -> Result<bool, Error> {
        if self.picking_pass(backend)?.is_none() {
            return Ok(false);
        }
        Ok(self
            .read_id(backend, x, y)?
            .map_or(false, |id| id != NO_HIT))
    }
}
