//! Function-type style properties.
//!
//! A style property is either a literal constant or a function definition. Functions without a
//! `property` key are evaluated with the zoom as input. Functions with a `property` key read the
//! input from the feature, optionally per zoom when their stops carry `{zoom, value}` inputs.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::tile::Properties;

/// How a property is resolved, which decides whether it becomes a uniform or an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    /// Same value for every feature and every zoom.
    Literal,
    /// Varies with the zoom only and is evaluated at draw time.
    ZoomFunction,
    /// Varies per feature and is baked into vertex attributes at pack time.
    FeatureFunction,
}

/// Whether numeric and color outputs between stops are blended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Interpolated,
    PiecewiseConstant,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FunctionType {
    Identity,
    Exponential,
    Interval,
    Categorical,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StopInput {
    Composite { zoom: f64, value: Value },
    Value(Value),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Stop(pub StopInput, pub Value);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub function_type: Option<FunctionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StyleProperty {
    Function(FunctionDefinition),
    Constant(Value),
}

impl<'de> Deserialize<'de> for StyleProperty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if is_function_definition(&value) {
            let definition = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
            Ok(StyleProperty::Function(definition))
        } else {
            Ok(StyleProperty::Constant(value))
        }
    }
}

fn is_function_definition(value: &Value) -> bool {
    match value.as_object() {
        Some(object) => {
            object.get("stops").map_or(false, Value::is_array)
                || object.get("type").and_then(Value::as_str) == Some("identity")
        }
        None => false,
    }
}

impl StyleProperty {
    pub fn constant(value: impl Into<Value>) -> Self {
        StyleProperty::Constant(value.into())
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            StyleProperty::Constant(_) => PropertyKind::Literal,
            StyleProperty::Function(definition) if definition.property.is_some() => {
                PropertyKind::FeatureFunction
            }
            StyleProperty::Function(_) => PropertyKind::ZoomFunction,
        }
    }

    /// Evaluates the property. `None` means the function produced no value for the input and
    /// the consumer's default applies.
    pub fn evaluate(
        &self,
        zoom: f64,
        properties: &Properties,
        interpolation: Interpolation,
    ) -> Option<Value> {
        match self {
            StyleProperty::Constant(value) => Some(value.clone()),
            StyleProperty::Function(definition) => {
                definition.evaluate(zoom, properties, interpolation)
            }
        }
    }

    /// Evaluates a property which does not depend on feature properties.
    pub fn evaluate_at_zoom(&self, zoom: f64, interpolation: Interpolation) -> Option<Value> {
        self.evaluate(zoom, &Properties::new(), interpolation)
    }
}

impl FunctionDefinition {
    pub fn evaluate(
        &self,
        zoom: f64,
        properties: &Properties,
        interpolation: Interpolation,
    ) -> Option<Value> {
        let input = match &self.property {
            None => Some(Value::from(zoom)),
            Some(name) => properties.get(name).map(|value| value.to_json()),
        };

        if self.function_type == Some(FunctionType::Identity) {
            return input.or_else(|| self.default.clone());
        }

        let Some(input) = input else {
            return self.default.clone();
        };

        let is_composite = self
            .stops
            .iter()
            .any(|stop| matches!(stop.0, StopInput::Composite { .. }));

        let output = if is_composite {
            self.evaluate_composite(zoom, &input, interpolation)
        } else {
            let stops: Vec<(Value, Value)> = self
                .stops
                .iter()
                .filter_map(|Stop(input, output)| match input {
                    StopInput::Value(input) => Some((input.clone(), output.clone())),
                    StopInput::Composite { .. } => None,
                })
                .collect();
            self.evaluate_stops(&stops, &input, interpolation)
        };

        output.or_else(|| self.default.clone())
    }

    /// Evaluates the property function per zoom stop, then blends the results across zooms.
    fn evaluate_composite(
        &self,
        zoom: f64,
        input: &Value,
        interpolation: Interpolation,
    ) -> Option<Value> {
        let mut zooms: Vec<f64> = self
            .stops
            .iter()
            .filter_map(|stop| match stop.0 {
                StopInput::Composite { zoom, .. } => Some(zoom),
                StopInput::Value(_) => None,
            })
            .collect();
        zooms.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        zooms.dedup();

        let mut zoom_stops = Vec::with_capacity(zooms.len());
        for stop_zoom in zooms {
            let stops: Vec<(Value, Value)> = self
                .stops
                .iter()
                .filter_map(|Stop(input, output)| match input {
                    StopInput::Composite { zoom, value } if *zoom == stop_zoom => {
                        Some((value.clone(), output.clone()))
                    }
                    _ => None,
                })
                .collect();
            if let Some(output) = self.evaluate_stops(&stops, input, interpolation) {
                zoom_stops.push((Value::from(stop_zoom), output));
            }
        }

        let zoom_type = match interpolation {
            Interpolation::Interpolated => FunctionType::Exponential,
            Interpolation::PiecewiseConstant => FunctionType::Interval,
        };
        evaluate_typed(zoom_type, self.base, &zoom_stops, &Value::from(zoom))
    }

    fn evaluate_stops(
        &self,
        stops: &[(Value, Value)],
        input: &Value,
        interpolation: Interpolation,
    ) -> Option<Value> {
        let function_type = self.function_type.unwrap_or(match (interpolation, input) {
            (_, Value::String(_)) | (_, Value::Bool(_)) => FunctionType::Categorical,
            (Interpolation::Interpolated, _) => FunctionType::Exponential,
            (Interpolation::PiecewiseConstant, _) => FunctionType::Interval,
        });
        let function_type = match (interpolation, function_type) {
            (Interpolation::PiecewiseConstant, FunctionType::Exponential) => FunctionType::Interval,
            (_, function_type) => function_type,
        };

        evaluate_typed(function_type, self.base, stops, input)
    }
}

fn evaluate_typed(
    function_type: FunctionType,
    base: Option<f64>,
    stops: &[(Value, Value)],
    input: &Value,
) -> Option<Value> {
    match function_type {
        FunctionType::Identity => Some(input.clone()),
        FunctionType::Categorical => stops
            .iter()
            .find(|(stop, _)| values_equal(stop, input))
            .map(|(_, output)| output.clone()),
        FunctionType::Interval => {
            let x = input.as_f64()?;
            let (first, _) = stops.first()?;
            if x < first.as_f64()? {
                return stops.first().map(|(_, output)| output.clone());
            }
            stops
                .iter()
                .take_while(|(stop, _)| stop.as_f64().map_or(false, |stop| stop <= x))
                .last()
                .map(|(_, output)| output.clone())
        }
        FunctionType::Exponential => {
            let x = input.as_f64()?;
            let (first_input, first_output) = stops.first()?;
            let (last_input, last_output) = stops.last()?;
            if x <= first_input.as_f64()? {
                return Some(first_output.clone());
            }
            if x >= last_input.as_f64()? {
                return Some(last_output.clone());
            }

            let upper = stops
                .iter()
                .position(|(stop, _)| stop.as_f64().map_or(false, |stop| stop > x))?;
            let (lower_input, lower_output) = &stops[upper - 1];
            let (upper_input, upper_output) = &stops[upper];
            let t = interpolation_factor(
                base.unwrap_or(1.0),
                x,
                lower_input.as_f64()?,
                upper_input.as_f64()?,
            );
            Some(interpolate(lower_output, upper_output, t))
        }
    }
}

fn interpolation_factor(base: f64, x: f64, lower: f64, upper: f64) -> f64 {
    let difference = upper - lower;
    if difference == 0.0 {
        return 0.0;
    }
    let progress = x - lower;
    if base == 1.0 {
        progress / difference
    } else {
        (base.powf(progress) - 1.0) / (base.powf(difference) - 1.0)
    }
}

fn interpolate(from: &Value, to: &Value, t: f64) -> Value {
    if let (Some(a), Some(b)) = (from.as_f64(), to.as_f64()) {
        return Value::from(a + (b - a) * t);
    }

    if let (Some(a), Some(b)) = (from.as_array(), to.as_array()) {
        if a.len() == b.len() {
            let blended: Option<Vec<Value>> = a
                .iter()
                .zip(b)
                .map(|(a, b)| Some(Value::from(a.as_f64()? + (b.as_f64()? - a.as_f64()?) * t)))
                .collect();
            if let Some(blended) = blended {
                return Value::Array(blended);
            }
        }
    }

    if let (Some(a), Some(b)) = (to_color(from), to_color(to)) {
        let mut color = [0.0; 4];
        for i in 0..4 {
            color[i] = a[i] as f64 + (b[i] as f64 - a[i] as f64) * t;
        }
        return Value::from(color.to_vec());
    }

    if t < 1.0 {
        from.clone()
    } else {
        to.clone()
    }
}

/// Equality which treats `1` and `1.0` as the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Reads a color from a CSS string or an array of unit floats.
pub fn to_color(value: &Value) -> Option<[f32; 4]> {
    match value {
        Value::String(css) => {
            let color = csscolorparser::parse(css).ok()?;
            Some([color.r as f32, color.g as f32, color.b as f32, color.a as f32])
        }
        Value::Array(channels) if channels.len() == 3 || channels.len() == 4 => {
            let mut color = [0.0, 0.0, 0.0, 1.0];
            for (i, channel) in channels.iter().enumerate() {
                color[i] = channel.as_f64()? as f32;
            }
            Some(color)
        }
        _ => None,
    }
}

/// Reads a number, accepting numeric strings as properties often carry them.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(string) => string.trim().parse().ok(),
        _ => None,
    }
}

/// A pair of numbers, a single number applies to both components.
pub fn to_vec2(value: &Value) -> Option<[f64; 2]> {
    if let Some(n) = value.as_f64() {
        return Some([n, n]);
    }
    match value.as_array()?.as_slice() {
        [x, y] => Some([x.as_f64()?, y.as_f64()?]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tile::PropertyValue;

    fn property(value: Value) -> StyleProperty {
        serde_json::from_value(value).unwrap()
    }

    fn props(name: &str, value: impl Into<PropertyValue>) -> Properties {
        Properties::from([(name.to_owned(), value.into())])
    }

    #[test]
    fn test_kinds() {
        assert_eq!(property(json!("#f00")).kind(), PropertyKind::Literal);
        assert_eq!(property(json!({"foo": 1})).kind(), PropertyKind::Literal);
        assert_eq!(
            property(json!({"stops": [[1, 1], [5, 2]]})).kind(),
            PropertyKind::ZoomFunction
        );
        assert_eq!(
            property(json!({"property": "height", "stops": [[1, 1]]})).kind(),
            PropertyKind::FeatureFunction
        );
        assert_eq!(
            property(json!({"type": "identity", "property": "height"})).kind(),
            PropertyKind::FeatureFunction
        );
    }

    #[test]
    fn test_zoom_function_interpolates() {
        let opacity = property(json!({"stops": [[10, 0.0], [20, 1.0]]}));
        let value = opacity.evaluate_at_zoom(15.0, Interpolation::Interpolated);
        assert_eq!(value, Some(json!(0.5)));

        let below = opacity.evaluate_at_zoom(2.0, Interpolation::Interpolated);
        assert_eq!(below, Some(json!(0.0)));
    }

    #[test]
    fn test_exponential_base() {
        let width = property(json!({"base": 2, "stops": [[0, 0.0], [2, 3.0]]}));
        let value = width
            .evaluate_at_zoom(1.0, Interpolation::Interpolated)
            .and_then(|v| v.as_f64())
            .unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_piecewise_constant_steps() {
        let fill = property(json!({"stops": [[10, "#f00"], [15, "#00f"]]}));
        let value = fill.evaluate_at_zoom(14.9, Interpolation::PiecewiseConstant);
        assert_eq!(value, Some(json!("#f00")));
        let value = fill.evaluate_at_zoom(15.0, Interpolation::PiecewiseConstant);
        assert_eq!(value, Some(json!("#00f")));
    }

    #[test]
    fn test_color_interpolation() {
        let fill = property(json!({"stops": [[0, "#000000"], [10, "#ffffff"]]}));
        let value = fill
            .evaluate_at_zoom(5.0, Interpolation::Interpolated)
            .unwrap();
        let color = to_color(&value).unwrap();
        assert!((color[0] - 0.5).abs() < 1e-6);
        assert_eq!(color[3], 1.0);
    }

    #[test]
    fn test_property_function_categorical_and_default() {
        let fill = property(json!({
            "property": "kind",
            "stops": [["lake", "#00f"], ["park", "#0f0"]],
            "default": "#fff"
        }));

        let value = fill.evaluate(0.0, &props("kind", "park"), Interpolation::Interpolated);
        assert_eq!(value, Some(json!("#0f0")));

        let value = fill.evaluate(0.0, &props("kind", "road"), Interpolation::Interpolated);
        assert_eq!(value, Some(json!("#fff")));

        let value = fill.evaluate(0.0, &Properties::new(), Interpolation::Interpolated);
        assert_eq!(value, Some(json!("#fff")));
    }

    #[test]
    fn test_composite_function() {
        let height = property(json!({
            "property": "levels",
            "stops": [
                [{"zoom": 10, "value": 0}, 0],
                [{"zoom": 10, "value": 10}, 10],
                [{"zoom": 20, "value": 0}, 0],
                [{"zoom": 20, "value": 10}, 30]
            ]
        }));

        let value = height
            .evaluate(15.0, &props("levels", 10.0), Interpolation::Interpolated)
            .and_then(|v| v.as_f64());
        assert_eq!(value, Some(20.0));
    }

    #[test]
    fn test_identity() {
        let width = property(json!({"type": "identity", "property": "width"}));
        let value = width.evaluate(0.0, &props("width", 4.0), Interpolation::Interpolated);
        assert_eq!(value, Some(json!(4.0)));
    }

    #[test]
    fn test_to_color() {
        assert_eq!(to_color(&json!("#ff0000")), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(to_color(&json!([0, 0, 1])), Some([0.0, 0.0, 1.0, 1.0]));
        assert_eq!(to_color(&json!("not a color")), None);
        assert_eq!(to_color(&json!(3)), None);
    }
}
