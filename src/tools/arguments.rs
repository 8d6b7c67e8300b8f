//! Named tool arguments.
//!
//! Clients are loose about JSON types (`"3"` for `3`, `"true"` for `true`),
//! so the accessors coerce the common spellings once, here.

use serde_json::{Map, Value};

use crate::error::ToolError;

/// The `arguments` object of a `tools/call` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// Wraps an argument map.
    #[must_use]
    pub const fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Builds arguments from a JSON value.
    ///
    /// `null` is treated as an empty map. Returns `None` for any other
    /// non-object value.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::default()),
            _ => None,
        }
    }

    /// Returns the raw value of an argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    /// Returns whether an argument was supplied.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// String argument. Numbers and booleans are rendered as text.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArgument`] for arrays and objects.
    pub fn str(&self, name: &str) -> Result<Option<String>, ToolError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(ToolError::invalid(name, "expected a string")),
        }
    }

    /// Integer argument; accepts numeric strings.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArgument`] when the value is not integral.
    pub fn i64(&self, name: &str) -> Result<Option<i64>, ToolError> {
        let invalid = || ToolError::invalid(name, "expected an integer");
        match self.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// Floating point argument; accepts numeric strings.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArgument`] when the value is not numeric.
    pub fn f64(&self, name: &str) -> Result<Option<f64>, ToolError> {
        let invalid = || ToolError::invalid(name, "expected a number");
        match self.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// Boolean argument.
    ///
    /// Accepts JSON booleans, `0`/`1`, and the strings
    /// `true`/`false`/`1`/`0`/`yes`/`no`/`on`/`off` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArgument`] for anything else.
    pub fn bool(&self, name: &str) -> Result<Option<bool>, ToolError> {
        let invalid = || ToolError::invalid(name, "expected a boolean");
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                _ => Err(invalid()),
            },
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(invalid()),
            },
            Some(_) => Err(invalid()),
        }
    }

    /// Array argument; a string is split on commas.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArgument`] for numbers, booleans and objects.
    pub fn array(&self, name: &str) -> Result<Option<Vec<Value>>, ToolError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items.clone())),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(Some(Vec::new())),
            Some(Value::String(s)) => Ok(Some(
                s.split(',')
                    .map(|item| Value::String(item.trim().to_string()))
                    .collect(),
            )),
            Some(_) => Err(ToolError::invalid(name, "expected an array")),
        }
    }

    /// Required string argument.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingArgument`] when absent, or the coercion error.
    pub fn require_str(&self, name: &str) -> Result<String, ToolError> {
        self.str(name)?
            .ok_or_else(|| ToolError::MissingArgument(name.to_string()))
    }

    /// Required integer argument.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingArgument`] when absent, or the coercion error.
    pub fn require_i64(&self, name: &str) -> Result<i64, ToolError> {
        self.i64(name)?
            .ok_or_else(|| ToolError::MissingArgument(name.to_string()))
    }

    /// Required boolean argument.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::MissingArgument`] when absent, or the coercion error.
    pub fn require_bool(&self, name: &str) -> Result<bool, ToolError> {
        self.bool(name)?
            .ok_or_else(|| ToolError::MissingArgument(name.to_string()))
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
