//! Painters turn packed tile buffers into meshes and draw them.
//!
//! There is one painter per plugin of the style. The set of painters is closed, see
//! [`PluginPainter`]. State that outlives a frame but belongs to the plugin rather than to the
//! painter instance lives in the [`SceneCache`] the renderer keeps per [`PluginId`].

use cgmath::Matrix4;
use serde_json::Value;

use crate::{
    coords::{TileInfo, Zoom},
    io::{PluginBuffer, SymbolGeometry},
    render::{
        backend::{
            BackendError, DrawCommand, DrawGeometry, FrameUniforms, GpuBackend, RenderTarget,
            Shading, StencilTest,
        },
        frame::FrameView,
        mesh::{Material, Mesh, UniformValue},
    },
    style::{
        function::{to_color, to_number, to_vec2, Interpolation, PropertyKind, StyleProperty},
        PluginId, PluginKind, ResolvedPlugin, SceneConfig,
    },
    util::ChangeObserver,
};

pub mod fill;
pub mod line;

pub use fill::FillPainter;
pub use line::LinePainter;

/// Zoom changes below this do not re-evaluate zoom functions.
const ZOOM_EPSILON: f64 = 0.001;

/// Per-plugin state kept across frames.
pub struct SceneCache {
    /// Zoom of the last drawn frame.
    pub zoom: ChangeObserver<Zoom>,
    /// A tile of the plugin was still fading in during the last frame.
    pub fading: bool,
    /// Tiles requested for the plugin which are not packed yet.
    pub pending_tiles: usize,
    pub fade_duration_ms: f64,
}

impl SceneCache {
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            zoom: ChangeObserver::default(),
            fading: false,
            pending_tiles: 0,
            fade_duration_ms: config.fade_duration_ms,
        }
    }

    /// Opacity of a tile loaded at `loaded_at_ms`.
    pub fn fade_opacity(&self, loaded_at_ms: f64, now_ms: f64) -> f64 {
        if self.fade_duration_ms <= 0.0 {
            return 1.0;
        }
        ((now_ms - loaded_at_ms) / self.fade_duration_ms).clamp(0.0, 1.0)
    }
}

/// Meshes a plugin draws of one tile.
#[derive(Clone, Debug)]
pub struct PluginTile {
    pub plugin_id: PluginId,
    pub meshes: Vec<Mesh>,
    /// Indexed by picking id, see [`crate::io::PluginBuffer::styled_features`].
    pub styled_features: Vec<u32>,
}

/// A tile as it is drawn in the current frame.
#[derive(Clone, Copy, Debug)]
pub struct TileDraw<'a> {
    pub info: &'a TileInfo,
    pub transform: Matrix4<f64>,
    /// `None` draws the tile without overlap resolution.
    pub stencil: Option<StencilTest>,
    pub loaded_at_ms: f64,
}

pub struct PaintContext<'a> {
    pub backend: &'a mut dyn GpuBackend,
    pub target: RenderTarget,
    pub frame: &'a FrameUniforms,
    pub timestamp_ms: f64,
}

/// A uniform fed by a style property.
pub struct UniformSource<'a> {
    pub uniform: &'static str,
    pub property: &'a Option<StyleProperty>,
    pub interpolation: Interpolation,
    /// Attribute and define flag used when the property is a per-feature function.
    pub attribute: Option<(&'static str, &'static str)>,
    pub convert: fn(&Value) -> Option<UniformValue>,
}

/// State shared by all painters.
pub struct PainterState {
    pub plugin: ResolvedPlugin,
    /// Zoom function uniforms per style rule, valid for `zoom`.
    zoom_uniforms: Vec<Material>,
    zoom: Option<Zoom>,
    canvas_size: [u32; 2],
    removed: bool,
}

impl PainterState {
    pub fn new(plugin: ResolvedPlugin) -> Self {
        Self {
            plugin,
            zoom_uniforms: Vec::new(),
            zoom: None,
            canvas_size: [0, 0],
            removed: false,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom.map_or(0.0, |zoom| zoom.value())
    }
}

/// Binds literal and zoom function properties to uniforms and per-feature functions to the
/// attributes packed for them.
pub fn bind_uniforms(mesh: &mut Mesh, sources: &[UniformSource<'_>], zoom: f64) {
    for source in sources {
        let Some(property) = source.property else {
            continue;
        };
        match property.kind() {
            PropertyKind::Literal | PropertyKind::ZoomFunction => {
                if let Some(value) = property
                    .evaluate_at_zoom(zoom, source.interpolation)
                    .as_ref()
                    .and_then(source.convert)
                {
                    mesh.material.set(source.uniform, value);
                }
            }
            PropertyKind::FeatureFunction => {
                if let Some((attribute, define)) = source.attribute {
                    if mesh.buffer.has_attribute(attribute) {
                        mesh.defines.insert(define);
                    }
                }
            }
        }
    }
}

/// Uniforms of the zoom functions among `sources`, evaluated at `zoom`.
pub fn zoom_uniforms(sources: &[UniformSource<'_>], zoom: f64) -> Material {
    let mut material = Material::default();
    for source in sources {
        let Some(property) = source.property else {
            continue;
        };
        if property.kind() != PropertyKind::ZoomFunction {
            continue;
        }
        if let Some(value) = property
            .evaluate_at_zoom(zoom, source.interpolation)
            .as_ref()
            .and_then(source.convert)
        {
            material.set(source.uniform, value);
        }
    }
    material
}

pub fn has_zoom_functions(sources: &[UniformSource<'_>]) -> bool {
    sources.iter().any(|source| {
        source
            .property
            .as_ref()
            .map_or(false, |property| property.kind() == PropertyKind::ZoomFunction)
    })
}

pub fn color_uniform(value: &Value) -> Option<UniformValue> {
    let color = to_color(value)?;
    Some(UniformValue::Vec4(color.map(|c| c as f64)))
}

pub fn number_uniform(value: &Value) -> Option<UniformValue> {
    to_number(value).map(UniformValue::Float)
}

pub fn vec2_uniform(value: &Value) -> Option<UniformValue> {
    to_vec2(value).map(UniformValue::Vec2)
}

pub fn text_uniform(value: &Value) -> Option<UniformValue> {
    value.as_str().map(|text| UniformValue::Text(text.to_owned()))
}

/// Everything a plugin needs to draw its part of the scene.
pub trait Painter {
    fn state(&self) -> &PainterState;

    fn state_mut(&mut self) -> &mut PainterState;

    /// Uniforms of the rule `symbol_index` which are driven by style properties.
    fn uniform_sources(&self, symbol_index: usize) -> Vec<UniformSource<'_>>;

    /// Builds the mesh of one packed geometry.
    fn create_mesh(&self, geometry: &SymbolGeometry, transform: Matrix4<f64>) -> Mesh;

    fn plugin_id(&self) -> PluginId {
        self.state().plugin.id
    }

    fn kind(&self) -> PluginKind {
        self.state().plugin.kind
    }

    /// Re-evaluates zoom functions when the zoom changed since the last frame.
    fn start_frame(&mut self, cache: &mut SceneCache, view: &FrameView) {
        *cache.zoom = view.gl_zoom;
        cache.fading = false;

        let stale = self.state().zoom_uniforms.len() != self.state().plugin.rules.len()
            || cache.zoom.did_change(ZOOM_EPSILON);
        if stale {
            let zoom = view.gl_zoom.value();
            let uniforms = (0..self.state().plugin.rules.len())
                .map(|index| zoom_uniforms(&self.uniform_sources(index), zoom))
                .collect();
            let state = self.state_mut();
            state.zoom_uniforms = uniforms;
            state.zoom = Some(view.gl_zoom);
        }
    }

    fn paint_tile(
        &self,
        context: &mut PaintContext<'_>,
        cache: &mut SceneCache,
        tile: &mut PluginTile,
        draw: &TileDraw<'_>,
    ) -> Result<(), BackendError> {
        let fade = cache.fade_opacity(draw.loaded_at_ms, context.timestamp_ms);
        if fade < 1.0 {
            cache.fading = true;
        }

        for mesh in &mut tile.meshes {
            self.prepare_mesh(mesh, draw);
            mesh.material.set("fadeOpacity", UniformValue::Float(fade));
            context.backend.submit_draw(&DrawCommand {
                target: context.target,
                geometry: DrawGeometry::Mesh(mesh),
                frame: context.frame,
                stencil: draw.stencil,
                color_write: true,
                shading: Shading::Color,
            })?;
        }
        Ok(())
    }

    /// Draws the picking ids of a tile, `base_id + picking id + 1` per feature.
    fn pick(
        &self,
        context: &mut PaintContext<'_>,
        tile: &mut PluginTile,
        draw: &TileDraw<'_>,
        base_id: u32,
    ) -> Result<(), BackendError> {
        for mesh in &mut tile.meshes {
            self.prepare_mesh(mesh, draw);
            context.backend.submit_draw(&DrawCommand {
                target: context.target,
                geometry: DrawGeometry::Mesh(mesh),
                frame: context.frame,
                stencil: draw.stencil,
                color_write: true,
                shading: Shading::Picking { base_id },
            })?;
        }
        Ok(())
    }

    /// Returns whether the plugin asks for another frame.
    fn end_frame(&mut self, cache: &mut SceneCache) -> bool {
        cache.zoom.update_reference();
        cache.fading
    }

    fn need_to_redraw(&self, cache: &SceneCache) -> bool {
        if self.state().removed {
            return false;
        }
        let zoom_changed = (0..self.state().plugin.rules.len())
            .any(|index| has_zoom_functions(&self.uniform_sources(index)))
            && cache.zoom.did_change(ZOOM_EPSILON);
        cache.fading || cache.pending_tiles > 0 || zoom_changed
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.state_mut().canvas_size = [width, height];
    }

    /// Drops all state. The painter draws nothing afterwards.
    fn remove(&mut self) {
        let state = self.state_mut();
        state.zoom_uniforms.clear();
        state.zoom = None;
        state.removed = true;
    }

    fn is_removed(&self) -> bool {
        self.state().removed
    }

    /// Updates the per-frame parts of a mesh.
    fn prepare_mesh(&self, mesh: &mut Mesh, draw: &TileDraw<'_>) {
        let state = self.state();
        mesh.local_transform = draw.transform;
        if let Some(uniforms) = state.zoom_uniforms.get(mesh.symbol_index) {
            for (name, value) in &uniforms.uniforms {
                mesh.material.set(*name, value.clone());
            }
        }
        let [width, height] = state.canvas_size;
        mesh.material.set(
            "canvasSize",
            UniformValue::Vec2([width as f64, height as f64]),
        );
    }
}

/// The closed set of painters, one variant per [`PluginKind`].
pub enum PluginPainter {
    Fill(FillPainter),
    Line(LinePainter),
}

impl PluginPainter {
    pub fn new(plugin: ResolvedPlugin) -> Self {
        match plugin.kind {
            PluginKind::Fill => PluginPainter::Fill(FillPainter::new(plugin)),
            PluginKind::Line => PluginPainter::Line(LinePainter::new(plugin)),
        }
    }

    pub fn as_painter(&self) -> &dyn Painter {
        match self {
            PluginPainter::Fill(painter) => painter,
            PluginPainter::Line(painter) => painter,
        }
    }

    pub fn as_painter_mut(&mut self) -> &mut dyn Painter {
        match self {
            PluginPainter::Fill(painter) => painter,
            PluginPainter::Line(painter) => painter,
        }
    }

    /// Builds the meshes of everything a plugin packed for a tile.
    pub fn create_tile(
        &self,
        buffer: &PluginBuffer,
        transform: Matrix4<f64>,
    ) -> PluginTile {
        let painter = self.as_painter();
        PluginTile {
            plugin_id: buffer.plugin_id,
            meshes: buffer
                .geometries
                .iter()
                .map(|geometry| painter.create_mesh(geometry, transform))
                .collect(),
            styled_features: buffer.styled_features.clone(),
        }
    }
}
