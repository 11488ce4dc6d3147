use serde_json::Value;

use crate::{
    pack::PackError,
    style::{
        function::{to_color, to_number, to_vec2, Interpolation, PropertyKind, StyleProperty},
        symbol::Symbol,
    },
    tile::Feature,
};

/// Per-feature function results of one feature. Properties which are literal or depend on the
/// zoom only stay `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureStyle {
    /// Unit RGBA.
    pub color: Option<[f32; 4]>,
    pub opacity: Option<f64>,
    pub uv_scale: Option<[f64; 2]>,
    pub uv_offset: Option<[f64; 2]>,
    pub pattern: Option<String>,
    pub line_width: Option<f64>,
}

/// A feature together with its resolved style, alive for a single pack call.
#[derive(Clone, Debug)]
pub struct StyledVector<'a> {
    pub feature: &'a Feature,
    /// Index of the feature within the packed plugin data, written to `aPickingId`.
    pub picking_id: u32,
    pub style: FeatureStyle,
}

/// Resolves the per-feature functions of `symbol` for `feature` at `zoom`.
///
/// Fails when a function yields a value of the wrong shape, e.g. a color which does not parse.
pub fn create_styled_vector<'a>(
    feature: &'a Feature,
    picking_id: u32,
    symbol: &Symbol,
    zoom: f64,
) -> Result<StyledVector<'a>, PackError> {
    let mut style = FeatureStyle::default();
    let resolver = Resolver { feature, zoom };

    match symbol {
        Symbol::Fill(symbol) => {
            style.color = resolver.resolve(
                "polygonFill",
                &symbol.polygon_fill,
                Interpolation::PiecewiseConstant,
                [1.0; 4],
                to_color,
            )?;
            style.opacity = resolver.resolve(
                "polygonOpacity",
                &symbol.polygon_opacity,
                Interpolation::Interpolated,
                1.0,
                to_number,
            )?;
            style.uv_scale = resolver.resolve(
                "uvScale",
                &symbol.uv_scale,
                Interpolation::Interpolated,
                [1.0, 1.0],
                to_vec2,
            )?;
            style.uv_offset = resolver.resolve(
                "uvOffset",
                &symbol.uv_offset,
                Interpolation::Interpolated,
                [0.0, 0.0],
                to_vec2,
            )?;
            style.pattern = resolver.resolve_pattern("polygonPatternFile", &symbol.polygon_pattern_file)?;
        }
        Symbol::Line(symbol) => {
            style.color = resolver.resolve(
                "lineColor",
                &symbol.line_color,
                Interpolation::PiecewiseConstant,
                [0.0, 0.0, 0.0, 1.0],
                to_color,
            )?;
            style.opacity = resolver.resolve(
                "lineOpacity",
                &symbol.line_opacity,
                Interpolation::Interpolated,
                1.0,
                to_number,
            )?;
            style.line_width = resolver.resolve(
                "lineWidth",
                &symbol.line_width,
                Interpolation::Interpolated,
                1.0,
                to_number,
            )?;
            style.pattern = resolver.resolve_pattern("linePatternFile", &symbol.line_pattern_file)?;
        }
    }

    Ok(StyledVector {
        feature,
        picking_id,
        style,
    })
}

struct Resolver<'a> {
    feature: &'a Feature,
    zoom: f64,
}

impl Resolver<'_> {
    fn resolve<T>(
        &self,
        name: &'static str,
        property: &Option<StyleProperty>,
        interpolation: Interpolation,
        default: T,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<T>, PackError> {
        let Some(property) = property else {
            return Ok(None);
        };
        if property.kind() != PropertyKind::FeatureFunction {
            return Ok(None);
        }

        match property.evaluate(self.zoom, &self.feature.properties, interpolation) {
            None | Some(Value::Null) => Ok(Some(default)),
            Some(value) => convert(&value)
                .map(Some)
                .ok_or_else(|| PackError::MalformedProperty {
                    property: name,
                    value: value.to_string(),
                }),
        }
    }

    fn resolve_pattern(
        &self,
        name: &'static str,
        property: &Option<StyleProperty>,
    ) -> Result<Option<String>, PackError> {
        let Some(property) = property else {
            return Ok(None);
        };
        let value = match property.kind() {
            PropertyKind::FeatureFunction => property.evaluate(
                self.zoom,
                &self.feature.properties,
                Interpolation::PiecewiseConstant,
            ),
            _ => property.evaluate_at_zoom(self.zoom, Interpolation::PiecewiseConstant),
        };

        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(pattern)) => Ok(Some(pattern)),
            Some(value) => Err(PackError::MalformedProperty {
                property: name,
                value: value.to_string(),
            }),
        }
    }
}
