//! Tools exposed to MCP clients.
//!
//! A tool is a named, described, schema-bearing callable. The registry keeps
//! them in registration order; the dispatcher lists and invokes them.
//!
//! # Modules
//!
//! - [`arguments`]: argument map with coercing accessors
//! - [`registry`]: the tool registry
//! - [`builtin`]: tools the server can register from configuration

pub mod arguments;
pub mod builtin;
pub mod registry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use arguments::Arguments;
pub use registry::{SharedRegistry, ToolRegistry};

use crate::error::ToolError;

/// JSON type declared for a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// JSON string.
    String,
    /// Whole number.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParameterType {
    /// Returns the JSON Schema type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared tool parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParameter {
    /// Property name in the arguments object.
    pub name: String,
    /// Declared JSON type.
    pub kind: ParameterType,
    /// Description shown to the model.
    pub description: String,
    /// Whether the argument must be present.
    pub required: bool,
}

impl ToolParameter {
    /// Creates a required parameter.
    #[must_use]
    pub fn required(
        name: impl Into<String>,
        kind: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    /// Creates an optional parameter.
    #[must_use]
    pub fn optional(
        name: impl Into<String>,
        kind: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Builds the `inputSchema` object advertised for a parameter list.
///
/// `properties` is always a JSON object, `{}` when there are no parameters.
#[must_use]
pub fn input_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in parameters {
        properties.insert(
            param.name.clone(),
            json!({
                "type": param.kind.as_str(),
                "description": param.description,
            }),
        );
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
        "additionalProperties": false,
    })
}

/// A callable unit exposed to MCP clients.
///
/// Implementations own their argument coercion; the dispatcher passes the
/// client's `arguments` object through unchanged.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Description for model consumption.
    fn description(&self) -> &str;

    /// Declared parameters, in schema order.
    fn parameters(&self) -> &[ToolParameter];

    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] describing why the call failed; the message is
    /// shown to the calling model.
    async fn invoke(&self, args: Arguments) -> Result<String, ToolError>;

    /// JSON Schema for the tool's input.
    fn input_schema(&self) -> Value {
        input_schema(self.parameters())
    }
}

/// Boxed future returned by closure-backed tools.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

type Handler = dyn Fn(Arguments) -> ToolFuture + Send + Sync;

/// A tool backed by a closure.
///
/// Built with [`ToolBuilder`]; the name cannot change once built.
pub struct FnTool {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    handler: Arc<Handler>,
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    async fn invoke(&self, args: Arguments) -> Result<String, ToolError> {
        (self.handler)(args).await
    }
}

/// Builder for [`FnTool`].
#[derive(Debug, Clone)]
pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
}

impl ToolBuilder {
    /// Starts a tool with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Finishes the tool with a synchronous handler.
    pub fn handler<F>(self, handler: F) -> FnTool
    where
        F: Fn(Arguments) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.async_handler(move |args| {
            let result = handler(args);
            let future: ToolFuture = Box::pin(async move { result });
            future
        })
    }

    /// Finishes the tool with a handler returning a boxed future.
    pub fn async_handler<F>(self, handler: F) -> FnTool
    where
        F: Fn(Arguments) -> ToolFuture + Send + Sync + 'static,
    {
        FnTool {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            handler: Arc::new(handler),
        }
    }
}
