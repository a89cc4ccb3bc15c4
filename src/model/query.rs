use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// A parameter value after coercion against the specification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Num(f64),
}

impl ParamValue {
    pub fn to_value(&self) -> Value {
        match self {
            ParamValue::Str(s) => Value::String(s.clone()),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Num(n) => Value::from(*n),
        }
    }

    /// Type-aware comparison against a document field. Strings compare to
    /// strings; an integer path value also matches a numeric string field.
    pub fn matches(&self, field: &Value) -> bool {
        match (self, field) {
            (ParamValue::Str(s), Value::String(f)) => s == f,
            (ParamValue::Int(i), Value::Number(n)) => n.as_i64() == Some(*i),
            (ParamValue::Int(i), Value::String(f)) => f.parse::<i64>() == Ok(*i),
            (ParamValue::Num(x), Value::Number(n)) => n.as_f64() == Some(*x),
            (ParamValue::Str(s), Value::Number(n)) => {
                s.parse::<f64>().ok() == n.as_f64()
            }
            (ParamValue::Str(s), Value::Bool(b)) => s.parse::<bool>() == Ok(*b),
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{}", s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Num(n) => write!(f, "{}", n),
        }
    }
}

/// Update dispatch mode for PUT and PATCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Replace,
    Merge,
}

/// Path, query and body information handed to the store adapter. The path is
/// always the *template* form, which the adapter's view planner keys on.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub path: String,
    pub path_params: BTreeMap<String, ParamValue>,
    pub query_params: BTreeMap<String, ParamValue>,
    pub body: Vec<u8>,
}

impl QueryParams {
    pub fn for_path(path: impl Into<String>) -> Self {
        QueryParams {
            path: path.into(),
            ..Default::default()
        }
    }
}
