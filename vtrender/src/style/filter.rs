//! Feature filters of style rules.

use std::cmp::Ordering;

use serde_json::Value;

use crate::{
    style::{function::values_equal, StyleError},
    tile::Feature,
};

/// Value a filter reads from a feature.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterKey {
    /// `$type`, the geometry type.
    GeometryType,
    /// `$layer`, the name of the source layer.
    Layer,
    Property(String),
}

impl FilterKey {
    fn parse(value: &Value) -> Result<Self, StyleError> {
        match value.as_str() {
            Some("$type") => Ok(FilterKey::GeometryType),
            Some("$layer") => Ok(FilterKey::Layer),
            Some(name) => Ok(FilterKey::Property(name.to_owned())),
            None => Err(StyleError::InvalidFilter(format!(
                "expected a key but found {value}"
            ))),
        }
    }

    fn lookup(&self, layer: &str, feature: &Feature) -> Option<Value> {
        match self {
            FilterKey::GeometryType => Some(Value::from(feature.geometry_type.as_str())),
            FilterKey::Layer => Some(Value::from(layer)),
            FilterKey::Property(name) => feature.properties.get(name).map(|value| value.to_json()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Matches every feature, used when a rule has no filter.
    Always,
    All(Vec<Filter>),
    Any(Vec<Filter>),
    NoneOf(Vec<Filter>),
    Comparison {
        op: ComparisonOp,
        key: FilterKey,
        value: Value,
    },
    In {
        key: FilterKey,
        values: Vec<Value>,
        negate: bool,
    },
    Has {
        key: FilterKey,
        negate: bool,
    },
}

impl Filter {
    /// Parses the array notation, e.g. `["all", ["==", "$type", "Polygon"], ["has", "height"]]`.
    /// `true` and `null` match everything.
    pub fn parse(value: &Value) -> Result<Filter, StyleError> {
        let array = match value {
            Value::Null | Value::Bool(true) => return Ok(Filter::Always),
            Value::Array(array) => array,
            _ => {
                return Err(StyleError::InvalidFilter(format!(
                    "expected an array but found {value}"
                )))
            }
        };

        let Some(op) = array.first().and_then(Value::as_str) else {
            return Err(StyleError::InvalidFilter(format!(
                "missing operator in {value}"
            )));
        };
        let operands = &array[1..];

        let filter = match op {
            "all" => Filter::All(Self::parse_all(operands)?),
            "any" => Filter::Any(Self::parse_all(operands)?),
            "none" => Filter::NoneOf(Self::parse_all(operands)?),
            "has" | "!has" => Filter::Has {
                key: FilterKey::parse(Self::operand(operands, 0, value)?)?,
                negate: op == "!has",
            },
            "in" | "!in" => Filter::In {
                key: FilterKey::parse(Self::operand(operands, 0, value)?)?,
                values: operands[1..].to_vec(),
                negate: op == "!in",
            },
            "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                let op = match op {
                    "==" => ComparisonOp::Equal,
                    "!=" => ComparisonOp::NotEqual,
                    "<" => ComparisonOp::Less,
                    "<=" => ComparisonOp::LessOrEqual,
                    ">" => ComparisonOp::Greater,
                    _ => ComparisonOp::GreaterOrEqual,
                };
                Filter::Comparison {
                    op,
                    key: FilterKey::parse(Self::operand(operands, 0, value)?)?,
                    value: Self::operand(operands, 1, value)?.clone(),
                }
            }
            other => {
                return Err(StyleError::InvalidFilter(format!(
                    "unknown operator `{other}`"
                )))
            }
        };

        Ok(filter)
    }

    fn parse_all(operands: &[Value]) -> Result<Vec<Filter>, StyleError> {
        operands.iter().map(Filter::parse).collect()
    }

    fn operand<'a>(operands: &'a [Value], i: usize, filter: &Value) -> Result<&'a Value, StyleError> {
        operands
            .get(i)
            .ok_or_else(|| StyleError::InvalidFilter(format!("missing operand in {filter}")))
    }

    pub fn matches(&self, layer: &str, feature: &Feature) -> bool {
        match self {
            Filter::Always => true,
            Filter::All(filters) => filters.iter().all(|filter| filter.matches(layer, feature)),
            Filter::Any(filters) => filters.iter().any(|filter| filter.matches(layer, feature)),
            Filter::NoneOf(filters) => !filters.iter().any(|filter| filter.matches(layer, feature)),
            Filter::Has { key, negate } => key.lookup(layer, feature).is_some() != *negate,
            Filter::In {
                key,
                values,
                negate,
            } => {
                let found = key
                    .lookup(layer, feature)
                    .map_or(false, |actual| values.iter().any(|v| values_equal(v, &actual)));
                found != *negate
            }
            Filter::Comparison { op, key, value } => {
                let actual = key.lookup(layer, feature);
                match op {
                    ComparisonOp::Equal => actual.map_or(false, |a| values_equal(&a, value)),
                    ComparisonOp::NotEqual => !actual.map_or(false, |a| values_equal(&a, value)),
                    _ => {
                        let Some(ordering) = actual.and_then(|a| compare(&a, value)) else {
                            return false;
                        };
                        match op {
                            ComparisonOp::Less => ordering == Ordering::Less,
                            ComparisonOp::LessOrEqual => ordering != Ordering::Greater,
                            ComparisonOp::Greater => ordering == Ordering::Greater,
                            _ => ordering != Ordering::Less,
                        }
                    }
                }
            }
        }
    }
}

/// Orders numbers numerically and strings lexically; mixed types are not comparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        style::filter::Filter,
        tile::{Feature, GeometryType},
    };

    fn building() -> Feature {
        Feature::new(GeometryType::Polygon, vec![])
            .with_property("height", 12.0)
            .with_property("kind", "school")
    }

    fn matches(filter: serde_json::Value) -> bool {
        Filter::parse(&filter).unwrap().matches("building", &building())
    }

    #[test]
    fn test_comparisons() {
        assert!(matches(json!(["==", "$type", "Polygon"])));
        assert!(matches(json!(["==", "$layer", "building"])));
        assert!(matches(json!(["==", "height", 12])));
        assert!(matches(json!(["!=", "kind", "park"])));
        assert!(matches(json!([">=", "height", 12])));
        assert!(!matches(json!(["<", "height", 5])));
        assert!(!matches(json!([">", "kind", 5])));
    }

    #[test]
    fn test_combinators() {
        assert!(matches(json!(["all", ["has", "height"], ["in", "kind", "school", "hospital"]])));
        assert!(matches(json!(["any", ["!has", "height"], ["==", "kind", "school"]])));
        assert!(matches(json!(["none", ["!in", "kind", "school"]])));
        assert!(matches(json!(true)));
        assert!(matches(json!(null)));
    }

    #[test]
    fn test_invalid_filters() {
        assert!(Filter::parse(&json!("kind")).is_err());
        assert!(Filter::parse(&json!(["~=", "kind", 1])).is_err());
        assert!(Filter::parse(&json!(["=="])).is_err());
    }
}
