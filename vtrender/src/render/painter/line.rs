//! Draws stroked lines.

use cgmath::Matrix4;
use serde_json::Value;

use crate::{
    io::SymbolGeometry,
    pack::{A_COLOR, A_LINE_WIDTH, A_OPACITY},
    render::{
        mesh::{defines, Mesh, ShaderKind, UniformValue},
        painter::{
            bind_uniforms, color_uniform, number_uniform, text_uniform, Painter, PainterState,
            UniformSource,
        },
    },
    style::{
        function::{Interpolation, StyleProperty},
        symbol::Symbol,
        ResolvedPlugin,
    },
};

/// Expands a dash array of one to four entries to exactly four.
fn dash_uniform(value: &Value) -> Option<UniformValue> {
    let dashes = value
        .as_array()?
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<_>>>()?;
    let expanded = match dashes.as_slice() {
        [a] => vec![*a, *a, *a, *a],
        [a, b] => vec![*a, *b, *a, *b],
        [a, b, c] => vec![*a, *b, *c, *c],
        [a, b, c, d] => vec![*a, *b, *c, *d],
        _ => return None,
    };
    Some(UniformValue::Array(expanded))
}

fn number_source<'a>(
    uniform: &'static str,
    property: &'a Option<StyleProperty>,
) -> UniformSource<'a> {
    UniformSource {
        uniform,
        property,
        interpolation: Interpolation::Interpolated,
        attribute: None,
        convert: number_uniform,
    }
}

pub struct LinePainter {
    state: PainterState,
}

impl LinePainter {
    pub fn new(plugin: ResolvedPlugin) -> Self {
        Self {
            state: PainterState::new(plugin),
        }
    }
}

impl Painter for LinePainter {
    fn state(&self) -> &PainterState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PainterState {
        &mut self.state
    }

    fn uniform_sources(&self, symbol_index: usize) -> Vec<UniformSource<'_>> {
        let Some(Symbol::Line(symbol)) = self
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
                uniform: "lineColor",
                property: &symbol.line_color,
                interpolation: Interpolation::PiecewiseConstant,
                attribute: Some((A_COLOR, defines::HAS_COLOR)),
                convert: color_uniform,
            },
            UniformSource {
                uniform: "lineOpacity",
                property: &symbol.line_opacity,
                interpolation: Interpolation::Interpolated,
                attribute: Some((A_OPACITY, defines::HAS_OPACITY)),
                convert: number_uniform,
            },
            UniformSource {
                uniform: "lineWidth",
                property: &symbol.line_width,
                interpolation: Interpolation::Interpolated,
                attribute: Some((A_LINE_WIDTH, defines::HAS_LINE_WIDTH)),
                convert: number_uniform,
            },
            number_source("lineGapWidth", &symbol.line_gap_width),
            number_source("lineBlur", &symbol.line_blur),
            number_source("lineDx", &symbol.line_dx),
            number_source("lineDy", &symbol.line_dy),
            UniformSource {
                uniform: "lineDasharray",
                property: &symbol.line_dasharray,
                interpolation: Interpolation::PiecewiseConstant,
                attribute: None,
                convert: dash_uniform,
            },
            UniformSource {
                uniform: "lineDashColor",
                property: &symbol.line_dash_color,
                interpolation: Interpolation::PiecewiseConstant,
                attribute: None,
                convert: color_uniform,
            },
            UniformSource {
                uniform: "linePatternFile",
                property: &symbol.line_pattern_file,
                interpolation: Interpolation::PiecewiseConstant,
                attribute: None,
                convert: text_uniform,
            },
        ]
    }

    fn create_mesh(&self, geometry: &SymbolGeometry, transform: Matrix4<f64>) -> Mesh {
        let mut mesh = Mesh::new(
            ShaderKind::Line,
            geometry.symbol_index,
            geometry.buffer.clone(),
        );
        mesh.local_transform = transform;

        let material = &mut mesh.material;
        material.set("lineColor", UniformValue::Vec4([0.0, 0.0, 0.0, 1.0]));
        material.set("lineOpacity", UniformValue::Float(1.0));
        material.set("lineWidth", UniformValue::Float(1.0));
        material.set("lineGapWidth", UniformValue::Float(0.0));
        material.set("lineDx", UniformValue::Float(0.0));
        material.set("lineDy", UniformValue::Float(0.0));
        material.set("lineBlur", UniformValue::Float(1.0));
        material.set("lineDasharray", UniformValue::Array(vec![0.0; 4]));
        material.set("lineDashColor", UniformValue::Vec4([0.0; 4]));

        let sources = self.uniform_sources(geometry.symbol_index);
        bind_uniforms(&mut mesh, &sources, self.state.zoom());

        let has_pattern = sources
            .iter()
            .any(|source| source.uniform == "linePatternFile" && source.property.is_some());
        if has_pattern {
            mesh.defines.insert(defines::HAS_PATTERN);
        }
        mesh.defines.insert(defines::IS_VT);
        mesh
    }
}
