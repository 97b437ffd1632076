//! Validated argument mapping handed to operation handlers

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

use super::coercion::json_type_name;

/// Error when a handler reads an argument in a shape it was not prepared as.
///
/// After validation this indicates a mismatch between an operation's schema
/// and its handler, not a client mistake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentAccessError {
    #[error("argument '{0}' is not present")]
    Missing(String),

    #[error("argument '{name}' should be {expected}, found {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Argument mapping after coercion, default substitution and path resolution.
///
/// Preserves the declaration order of the operation's parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolArguments {
    values: IndexMap<String, Value>,
}

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Raw value; explicit `null` reads as absent
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    fn require(&self, name: &str) -> Result<&Value, ArgumentAccessError> {
        self.get(name)
            .ok_or_else(|| ArgumentAccessError::Missing(name.to_string()))
    }

    fn wrong_type(name: &str, expected: &'static str, value: &Value) -> ArgumentAccessError {
        ArgumentAccessError::WrongType {
            name: name.to_string(),
            expected,
            found: json_type_name(value),
        }
    }

    pub fn str(&self, name: &str) -> Result<&str, ArgumentAccessError> {
        let value = self.require(name)?;
        value
            .as_str()
            .ok_or_else(|| Self::wrong_type(name, "string", value))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, ArgumentAccessError> {
        self.get(name).map(|_| self.str(name)).transpose()
    }

    pub fn path(&self, name: &str) -> Result<PathBuf, ArgumentAccessError> {
        self.str(name).map(PathBuf::from)
    }

    pub fn opt_path(&self, name: &str) -> Result<Option<PathBuf>, ArgumentAccessError> {
        self.get(name).map(|_| self.path(name)).transpose()
    }

    pub fn f64(&self, name: &str) -> Result<f64, ArgumentAccessError> {
        let value = self.require(name)?;
        value
            .as_f64()
            .ok_or_else(|| Self::wrong_type(name, "number", value))
    }

    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>, ArgumentAccessError> {
        self.get(name).map(|_| self.f64(name)).transpose()
    }

    pub fn i64(&self, name: &str) -> Result<i64, ArgumentAccessError> {
        let value = self.require(name)?;
        value
            .as_i64()
            .ok_or_else(|| Self::wrong_type(name, "integer", value))
    }

    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>, ArgumentAccessError> {
        self.get(name).map(|_| self.i64(name)).transpose()
    }

    pub fn bool(&self, name: &str) -> Result<bool, ArgumentAccessError> {
        let value = self.require(name)?;
        value
            .as_bool()
            .ok_or_else(|| Self::wrong_type(name, "boolean", value))
    }

    pub fn array(&self, name: &str) -> Result<&Vec<Value>, ArgumentAccessError> {
        let value = self.require(name)?;
        value
            .as_array()
            .ok_or_else(|| Self::wrong_type(name, "array", value))
    }

    pub fn opt_array(&self, name: &str) -> Result<Option<&Vec<Value>>, ArgumentAccessError> {
        self.get(name).map(|_| self.array(name)).transpose()
    }

    pub fn object(&self, name: &str) -> Result<&Map<String, Value>, ArgumentAccessError> {
        let value = self.require(name)?;
        value
            .as_object()
            .ok_or_else(|| Self::wrong_type(name, "object", value))
    }

    pub fn opt_object(
        &self,
        name: &str,
    ) -> Result<Option<&Map<String, Value>>, ArgumentAccessError> {
        self.get(name).map(|_| self.object(name)).transpose()
    }

    /// Sequence of numbers, e.g. a coordinate pair
    pub fn f64_list(&self, name: &str) -> Result<Vec<f64>, ArgumentAccessError> {
        self.array(name)?
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| Self::wrong_type(name, "array<number>", v)))
            .collect()
    }

    pub fn opt_f64_list(&self, name: &str) -> Result<Option<Vec<f64>>, ArgumentAccessError> {
        self.get(name).map(|_| self.f64_list(name)).transpose()
    }

    pub fn str_list(&self, name: &str) -> Result<Vec<String>, ArgumentAccessError> {
        self.array(name)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Self::wrong_type(name, "array<string>", v))
            })
            .collect()
    }

    pub fn opt_str_list(&self, name: &str) -> Result<Option<Vec<String>>, ArgumentAccessError> {
        self.get(name).map(|_| self.str_list(name)).transpose()
    }
}

impl FromIterator<(String, Value)> for ToolArguments {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
