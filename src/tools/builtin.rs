//! Tools the server can register from configuration.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use super::{Arguments, ParameterType, Tool, ToolParameter, ToolRegistry};
use crate::error::ToolError;

/// Names of the built-in tools, in registration order.
pub const BUILTIN_TOOLS: [&str; 2] = [EchoTool::NAME, CurrentTimeTool::NAME];

/// Group under which built-in tools are registered.
pub const BUILTIN_GROUP: &str = "builtin";

/// Returns a built-in tool by name.
#[must_use]
pub fn builtin_tool(name: &str) -> Option<Arc<dyn Tool>> {
    match name {
        EchoTool::NAME => Some(Arc::new(EchoTool)),
        CurrentTimeTool::NAME => Some(Arc::new(CurrentTimeTool)),
        _ => None,
    }
}

/// Registers the named built-in tools under [`BUILTIN_GROUP`].
///
/// Unknown names are skipped; configuration validation rejects them earlier.
/// Returns the number of tools inserted.
pub fn register_builtins<S: AsRef<str>>(registry: &mut ToolRegistry, names: &[S]) -> usize {
    registry.add_group(
        BUILTIN_GROUP,
        names.iter().filter_map(|name| builtin_tool(name.as_ref())),
    )
}

/// Returns its `text` argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTool;

impl EchoTool {
    /// Tool name.
    pub const NAME: &'static str = "echo";
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Echo the given text back to the caller. Useful for checking connectivity."
    }

    fn parameters(&self) -> &[ToolParameter] {
        static PARAMS: OnceLock<Vec<ToolParameter>> = OnceLock::new();
        PARAMS.get_or_init(|| {
            vec![
                ToolParameter::required("text", ParameterType::String, "Text to echo back"),
                ToolParameter::optional(
                    "uppercase",
                    ParameterType::Boolean,
                    "Return the text in upper case",
                ),
            ]
        })
    }

    async fn invoke(&self, args: Arguments) -> Result<String, ToolError> {
        let text = args.require_str("text")?;
        if args.bool("uppercase")?.unwrap_or(false) {
            return Ok(text.to_uppercase());
        }
        Ok(text)
    }
}

/// Reports the server's current UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTimeTool;

impl CurrentTimeTool {
    /// Tool name.
    pub const NAME: &'static str = "current_time";
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Return the current UTC time. Defaults to RFC 3339; pass a strftime \
         pattern in `format` for other layouts, or `unix` for epoch seconds."
    }

    fn parameters(&self) -> &[ToolParameter] {
        static PARAMS: OnceLock<Vec<ToolParameter>> = OnceLock::new();
        PARAMS.get_or_init(|| {
            vec![ToolParameter::optional(
                "format",
                ParameterType::String,
                "strftime pattern, `rfc3339` (default) or `unix`",
            )]
        })
    }

    async fn invoke(&self, args: Arguments) -> Result<String, ToolError> {
        let now = Utc::now();
        match args.str("format")?.as_deref().map(str::trim) {
            None | Some("" | "rfc3339") => Ok(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Some("unix") => Ok(now.timestamp().to_string()),
            Some(pattern) => {
                use std::fmt::Write as _;

                let mut out = String::new();
                write!(out, "{}", now.format(pattern))
                    .map_err(|_| ToolError::invalid("format", "unsupported strftime pattern"))?;
                Ok(out)
            }
        }
    }
}
