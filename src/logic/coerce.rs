use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::model::{Items, Operation, ParamValue, Parameter};

/// Suffixes that pair a concrete query name with a declared `{name}Range`
/// parameter.
pub const RANGE_START: &str = "RangeStart";
pub const RANGE_END: &str = "RangeEnd";

/// A request parameter failed validation against the specification. All
/// variants map to a 409 at the HTTP boundary.
#[derive(Debug, Error, PartialEq)]
pub enum CoerceError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("the value {value} for {name} does not parse as {expected}")]
    Parse {
        name: String,
        value: String,
        expected: String,
    },
    #[error("the value {value} for {name} is below the minimum {minimum}")]
    BelowMinimum {
        name: String,
        value: String,
        minimum: f64,
    },
    #[error("the value {value} for {name} is above the maximum {maximum}")]
    AboveMaximum {
        name: String,
        value: String,
        maximum: f64,
    },
    #[error("the value {value} for {name} is not one of {allowed}")]
    NotInEnum {
        name: String,
        value: String,
        allowed: String,
    },
}

// The declared type/format/bounds/enum a raw value coerces against, whether
// they come from the parameter itself or from a range parameter's items.
struct Target<'a> {
    type_: &'a str,
    enum_: &'a [Value],
    minimum: Option<f64>,
    maximum: Option<f64>,
}

impl<'a> Target<'a> {
    fn of_parameter(param: &'a Parameter) -> Self {
        Target {
            type_: param.type_.as_deref().unwrap_or(""),
            enum_: &param.enum_,
            minimum: param.minimum,
            maximum: param.maximum,
        }
    }

    fn of_items(items: &'a Items) -> Self {
        Target {
            type_: items.type_.as_deref().unwrap_or(""),
            enum_: &[],
            minimum: items.minimum,
            maximum: items.maximum,
        }
    }
}

/// Coerces one raw string against the named parameter of an operation.
///
/// `{field}RangeStart` / `{field}RangeEnd` names resolve to the declared
/// `{field}Range` parameter and coerce against its element type.
pub fn coerce(op: &Operation, name: &str, raw: &str) -> Result<ParamValue, CoerceError> {
    let target = match op.parameter(name) {
        Some(param) => Target::of_parameter(param),
        None => range_target(op, name)
            .ok_or_else(|| CoerceError::UnknownParameter(name.to_string()))?,
    };

    let value = match target.type_ {
        "integer" => ParamValue::Int(raw.parse::<i64>().map_err(|_| CoerceError::Parse {
            name: name.to_string(),
            value: raw.to_string(),
            expected: "integer".to_string(),
        })?),
        "number" => ParamValue::Num(raw.parse::<f64>().map_err(|_| CoerceError::Parse {
            name: name.to_string(),
            value: raw.to_string(),
            expected: "number".to_string(),
        })?),
        _ => ParamValue::Str(raw.to_string()),
    };

    if let (Some(minimum), Some(maximum)) = (target.minimum, target.maximum) {
        if minimum != maximum {
            let numeric = match &value {
                ParamValue::Int(i) => Some(*i as f64),
                ParamValue::Num(n) => Some(*n),
                ParamValue::Str(_) => None,
            };
            if let Some(n) = numeric {
                if n < minimum {
                    return Err(CoerceError::BelowMinimum {
                        name: name.to_string(),
                        value: raw.to_string(),
                        minimum,
                    });
                }
                if n > maximum {
                    return Err(CoerceError::AboveMaximum {
                        name: name.to_string(),
                        value: raw.to_string(),
                        maximum,
                    });
                }
            }
        }
    }

    if !target.enum_.is_empty() {
        let hit = target.enum_.iter().any(|allowed| value.matches_enum(allowed));
        if !hit {
            return Err(CoerceError::NotInEnum {
                name: name.to_string(),
                value: raw.to_string(),
                allowed: serde_json::to_string(&target.enum_).unwrap_or_default(),
            });
        }
    }

    Ok(value)
}

fn range_target<'a>(op: &'a Operation, name: &'a str) -> Option<Target<'a>> {
    let base = name
        .strip_suffix(RANGE_START)
        .or_else(|| name.strip_suffix(RANGE_END))?;
    let param = op.parameter(&format!("{}Range", base))?;
    Some(match &param.items {
        Some(items) => Target::of_items(items),
        None => Target::of_parameter(param),
    })
}

/// Coerces a whole map of raw values, preserving name order.
pub fn coerce_map<'a, I>(op: &Operation, raw: I) -> Result<BTreeMap<String, ParamValue>, CoerceError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = BTreeMap::new();
    for (name, value) in raw {
        out.insert(name.to_string(), coerce(op, name, value)?);
    }
    Ok(out)
}

impl ParamValue {
    // Enum membership compares coerced values, not their string forms.
    fn matches_enum(&self, allowed: &Value) -> bool {
        match (self, allowed) {
            (ParamValue::Str(s), Value::String(a)) => s == a,
            (ParamValue::Int(i), Value::Number(n)) => n.as_i64() == Some(*i),
            (ParamValue::Num(x), Value::Number(n)) => n.as_f64() == Some(*x),
            _ => false,
        }
    }
}
