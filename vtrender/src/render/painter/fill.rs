//! Draws polygons, optionally filled with a pattern.

use cgmath::Matrix4;

use crate::{
    io::SymbolGeometry,
    pack::{A_COLOR, A_OPACITY, A_TEX_INFO, A_UV_OFFSET, A_UV_SCALE},
    render::{
        mesh::{defines, Mesh, ShaderKind, UniformValue},
        painter::{
            bind_uniforms, color_uniform, number_uniform, text_uniform, vec2_uniform, Painter,
            PainterState, UniformSource,
        },
    },
    style::{function::Interpolation, symbol::Symbol, ResolvedPlugin},
};

const POLYGON_PATTERN_FILE: &str = "polygonPatternFile";

pub struct FillPainter {
    state: PainterState,
}

impl FillPainter {
    pub fn new(plugin: ResolvedPlugin) -> Self {
        Self {
            state: PainterState::new(plugin),
        }
    }
}

impl Painter for FillPainter {
    fn state(&self) -> &PainterState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PainterState {
        &mut self.state
    }

    fn uniform_sources(&self, symbol_index: usize) -> Vec<UniformSource<'_>> {
        let Some(Symbol::Fill(symbol)) = self
            .state
            .plugin
            .rules
            .get(symbol_index)
            .map(|rule| &rule.symbol)
        else {
            return Vec::new();
        };

        vec![
            UniformSource {
                uniform: "polygonFill",
                property: &symbol.polygon_fill,
                interpolation: Interpolation::PiecewiseConstant,
                attribute: Some((A_COLOR, defines::HAS_COLOR)),
                convert: color_uniform,
            },
            UniformSource {
                uniform: "polygonOpacity",
                property: &symbol.polygon_opacity,
                interpolation: Interpolation::Interpolated,
                attribute: Some((A_OPACITY, defines::HAS_OPACITY)),
                convert: number_uniform,
            },
            UniformSource {
                uniform: "uvScale",
                property: &symbol.uv_scale,
                interpolation: Interpolation::Interpolated,
                attribute: Some((A_UV_SCALE, defines::HAS_UV_SCALE)),
                convert: vec2_uniform,
            },
            UniformSource {
                uniform: "uvOffset",
                property: &symbol.uv_offset,
                interpolation: Interpolation::Interpolated,
                attribute: Some((A_UV_OFFSET, defines::HAS_UV_OFFSET)),
                convert: vec2_uniform,
            },
            UniformSource {
                uniform: POLYGON_PATTERN_FILE,
                property: &symbol.polygon_pattern_file,
                interpolation: Interpolation::PiecewiseConstant,
                attribute: Some((A_TEX_INFO, defines::HAS_PATTERN)),
                convert: text_uniform,
            },
        ]
    }

    fn create_mesh(&self, geometry: &SymbolGeometry, transform: Matrix4<f64>) -> Mesh {
        let mut mesh = Mesh::new(
            ShaderKind::Fill,
            geometry.symbol_index,
            geometry.buffer.clone(),
        );
        mesh.local_transform = transform;

        let material = &mut mesh.material;
        material.set("polygonFill", UniformValue::Vec4([1.0; 4]));
        material.set("polygonOpacity", UniformValue::Float(1.0));
        material.set("uvScale", UniformValue::Vec2([1.0, 1.0]));
        material.set("uvOffset", UniformValue::Vec2([0.0, 0.0]));

        bind_uniforms(
            &mut mesh,
            &self.uniform_sources(geometry.symbol_index),
            self.state.zoom(),
        );
        if mesh.material.get(POLYGON_PATTERN_FILE).is_some() {
            mesh.defines.insert(defines::HAS_PATTERN);
        }
        mesh.defines.insert(defines::IS_VT);
        mesh
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Matrix4, SquareMatrix};

    use crate::{
        coords::{TileInfo, WorldTileCoords, Zoom},
        io::{pipeline::process_tile, PackRequest, PackTileInfo, PluginBuffer},
        pack::PackOptions,
        render::{
            frame::{FrameView, VisibleTiles},
            mesh::{defines, UniformValue},
            painter::{FillPainter, Painter, SceneCache, TileDraw},
        },
        style::Style,
        tile::{Feature, GeometryType, RawTile, SourceLayer},
    };

    fn packed(style: &Style) -> PluginBuffer {
        let square = Feature::new(
            GeometryType::Polygon,
            vec![vec![
                [0.0, 0.0, 0.0],
                [100.0, 0.0, 0.0],
                [100.0, 100.0, 0.0],
                [0.0, 100.0, 0.0],
            ]],
        )
        .with_property("shade", "#00ff00");
        let raw = RawTile::Layers(vec![SourceLayer {
            name: "landuse".to_owned(),
            extent: Some(4096),
            features: vec![square],
        }]);
        let request = PackRequest {
            tile_info: PackTileInfo {
                x: 0,
                y: 0,
                z: 10,
                resolution: 1.0,
            },
            gl_scale: 1.0,
            z_scale: 1.0,
            extent: 4096,
        };

        let response = process_tile(&request, raw, style, &PackOptions::default()).unwrap();
        response.per_plugin_buffers[0].clone().unwrap()
    }

    #[test]
    fn test_literals_become_uniforms() {
        let style = Style::from_json(
            r##"[{"type": "fill", "style": [{"symbol": {"polygonFill": "#f00", "polygonOpacity": 0.4}}]}]"##,
        )
        .unwrap();
        let buffer = packed(&style);
        let painter = FillPainter::new(style.plugins[0].clone());

        let mesh = painter.create_mesh(&buffer.geometries[0], Matrix4::identity());
        assert_eq!(mesh.material.vec4("polygonFill"), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(mesh.material.float("polygonOpacity"), Some(0.4));
        assert_eq!(mesh.material.get("uvScale"), Some(&UniformValue::Vec2([1.0, 1.0])));
        assert!(!mesh.has_define(defines::HAS_COLOR));
        assert!(mesh.has_define(defines::IS_VT));
    }

    #[test]
    fn test_feature_functions_set_defines() {
        let style = Style::from_json(
            r##"[{"type": "fill", "style": [{"symbol": {
                "polygonFill": {"property": "shade", "type": "identity"}
            }}]}]"##,
        )
        .unwrap();
        let buffer = packed(&style);
        let painter = FillPainter::new(style.plugins[0].clone());

        let mesh = painter.create_mesh(&buffer.geometries[0], Matrix4::identity());
        assert!(mesh.has_define(defines::HAS_COLOR));
        assert!(!mesh.has_define(defines::HAS_OPACITY));
        assert_eq!(mesh.material.vec4("polygonFill"), Some([1.0; 4]));
    }

    #[test]
    fn test_zoom_functions_follow_the_frame() {
        let style = Style::from_json(
            r##"[{"type": "fill", "style": [{"symbol": {
                "polygonOpacity": {"stops": [[10, 0.0], [20, 1.0]]}
            }}]}]"##,
        )
        .unwrap();
        let plugin = style.plugins[0].clone();
        let buffer = packed(&style);
        let mut painter = FillPainter::new(plugin.clone());
        let mut cache = SceneCache::new(&plugin.scene_config);

        let view = FrameView::top_down(VisibleTiles::default(), 15.0, 8, 8);
        painter.start_frame(&mut cache, &view);
        let mut mesh = painter.create_mesh(&buffer.geometries[0], Matrix4::identity());
        assert_eq!(mesh.material.float("polygonOpacity"), Some(0.5));
        painter.end_frame(&mut cache);
        assert!(!painter.need_to_redraw(&cache));

        let mut view = view;
        view.gl_zoom = Zoom::new(20.0);
        *cache.zoom = view.gl_zoom;
        assert!(painter.need_to_redraw(&cache));

        painter.start_frame(&mut cache, &view);
        let info = TileInfo::from_grid(WorldTileCoords::new(0, 0, 10), 512.0, 1.0);
        let draw = TileDraw {
            info: &info,
            transform: Matrix4::identity(),
            stencil: None,
            loaded_at_ms: 0.0,
        };
        painter.prepare_mesh(&mut mesh, &draw);
        assert_eq!(mesh.material.float("polygonOpacity"), Some(1.0));
    }
}
