//! Argument coercion
//!
//! Clients (language models in particular) send loosely-typed values: numbers
//! as strings, booleans as `"True"`, lists as JSON-encoded text. [`coerce`]
//! converts a raw value into the shape its [`ParameterKind`] declares, or
//! reports why it cannot.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::entities::ParameterKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("expected {expected}, got {found}")]
    Mismatch { expected: String, found: &'static str },

    #[error("expected {expected}, got unparseable string '{value}'")]
    Unparseable { expected: String, value: String },

    #[error("item {index}: {source}")]
    Item {
        index: usize,
        #[source]
        source: Box<CoercionError>,
    },
}

impl CoercionError {
    fn mismatch(kind: &ParameterKind, value: &Value) -> Self {
        CoercionError::Mismatch {
            expected: kind.type_name(),
            found: json_type_name(value),
        }
    }

    fn unparseable(kind: &ParameterKind, value: &str) -> Self {
        CoercionError::Unparseable {
            expected: kind.type_name(),
            value: crate::util::truncate_str(value, 64).to_string(),
        }
    }
}

/// JSON type name of a value, as reported in coercion errors
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a raw argument value to the declared kind.
pub fn coerce(kind: &ParameterKind, value: &Value) -> Result<Value, CoercionError> {
    match kind {
        ParameterKind::Any => Ok(value.clone()),
        ParameterKind::Optional(inner) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                coerce(inner, value)
            }
        }
        ParameterKind::String | ParameterKind::Path => coerce_string(kind, value),
        ParameterKind::Number => coerce_number(kind, value),
        ParameterKind::Integer => coerce_integer(kind, value),
        ParameterKind::Boolean => coerce_boolean(kind, value),
        ParameterKind::Sequence(item) => coerce_sequence(kind, item, value),
        ParameterKind::Mapping => coerce_mapping(kind, value),
    }
}

fn coerce_string(kind: &ParameterKind, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        _ => Err(CoercionError::mismatch(kind, value)),
    }
}

fn coerce_number(kind: &ParameterKind, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| CoercionError::unparseable(kind, s)),
        _ => Err(CoercionError::mismatch(kind, value)),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn coerce_integer(kind: &ParameterKind, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(value.clone());
            }
            n.as_f64()
                .and_then(integral)
                .map(Value::from)
                .ok_or_else(|| CoercionError::Mismatch {
                    expected: kind.type_name(),
                    found: "fractional number",
                })
        }
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
                .map(Value::from)
                .ok_or_else(|| CoercionError::unparseable(kind, s))
        }
        _ => Err(CoercionError::mismatch(kind, value)),
    }
}

fn coerce_boolean(kind: &ParameterKind, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => Ok(Value::Bool(false)),
            Some(f) if f == 1.0 => Ok(Value::Bool(true)),
            _ => Err(CoercionError::unparseable(kind, &n.to_string())),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(CoercionError::unparseable(kind, s)),
        },
        _ => Err(CoercionError::mismatch(kind, value)),
    }
}

fn coerce_sequence(
    kind: &ParameterKind,
    item: &ParameterKind,
    value: &Value,
) -> Result<Value, CoercionError> {
    let items = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) if s.trim_start().starts_with('[') => {
            match serde_json::from_str::<Value>(s) {
                Ok(Value::Array(items)) => items,
                _ => return Err(CoercionError::unparseable(kind, s)),
            }
        }
        _ => return Err(CoercionError::mismatch(kind, value)),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, v)| {
            coerce(item, v).map_err(|e| CoercionError::Item {
                index,
                source: Box::new(e),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn coerce_mapping(kind: &ParameterKind, value: &Value) -> Result<Value, CoercionError> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(s) if s.trim_start().starts_with('{') => {
            match serde_json::from_str::<Map<String, Value>>(s) {
                Ok(map) => Ok(Value::Object(map)),
                Err(_) => Err(CoercionError::unparseable(kind, s)),
            }
        }
        _ => Err(CoercionError::mismatch(kind, value)),
    }
}
