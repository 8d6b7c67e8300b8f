//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every section is optional; missing sections take their defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::ServerContext;
use crate::tools::builtin::{builtin_tool, BUILTIN_TOOLS};

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server identity and instructions.
    #[serde(default)]
    pub server: ServerConfig,

    /// Transport selection.
    #[serde(default)]
    pub transport: TransportConfig,

    /// HTTP/SSE transport settings.
    #[serde(default)]
    pub sse: SseConfig,

    /// Session storage settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Built-in tool selection.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::validation("server.name must not be empty"));
        }
        if self.server.tool_timeout_secs == Some(0) {
            return Err(ConfigError::validation(
                "server.tool_timeout_secs must be greater than 0 (omit it to disable)",
            ));
        }

        self.sse.validate()?;
        self.session.validate()?;

        if let Some(unknown) = self.tools.enabled.iter().find(|n| builtin_tool(n).is_none()) {
            return Err(ConfigError::validation(format!(
                "Unknown built-in tool '{unknown}'. Must be one of: {}",
                BUILTIN_TOOLS.join(", ")
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}

/// Server identity and the context given to clients at initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Instructions returned from `initialize`.
    #[serde(default)]
    pub instructions: Option<String>,

    /// Extra context entries appended to the instructions.
    #[serde(default)]
    pub context: Vec<String>,

    /// Upper bound on a single tool call, in seconds. Unset means no limit.
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
}

impl ServerConfig {
    /// The context the dispatcher reports to clients.
    #[must_use]
    pub fn server_context(&self) -> ServerContext {
        ServerContext {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            context: self.context.clone(),
            ..ServerContext::default()
        }
    }

    /// The per-call tool timeout.
    #[must_use]
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            instructions: None,
            context: Vec::new(),
            tool_timeout_secs: None,
        }
    }
}

fn default_server_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

/// Which transport serves MCP traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Newline-delimited JSON over stdin/stdout.
    #[default]
    Stdio,
    /// HTTP with server-sent events.
    Sse,
}

/// Transport configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Transport mode: "stdio" or "sse".
    #[serde(default)]
    pub mode: TransportMode,
}

/// HTTP/SSE transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SseConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Path clients POST JSON-RPC messages to.
    #[serde(default = "default_post_path")]
    pub post_path: String,

    /// Path of the event stream.
    #[serde(default = "default_sse_path")]
    pub sse_path: String,

    /// Seconds between heartbeat comments; zero or negative disables them.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: i64,

    /// Milliseconds between queue polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Close the stream this many seconds after the first reply is
    /// delivered. `null` keeps streams open until the client leaves.
    #[serde(default = "default_keep_alive_window")]
    pub keep_alive_window_secs: Option<u64>,
}

impl SseConfig {
    /// The parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if `bind_addr` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|e| {
            ConfigError::validation(format!("Invalid sse.bind_addr '{}': {e}", self.bind_addr))
        })
    }

    /// Heartbeat period, or `None` when disabled.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        u64::try_from(self.heartbeat_interval_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Queue poll period.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stream lifetime after the first delivered reply.
    #[must_use]
    pub fn keep_alive_window(&self) -> Option<Duration> {
        self.keep_alive_window_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "sse.poll_interval_ms must be greater than 0",
            ));
        }
        for (field, path) in [("post_path", &self.post_path), ("sse_path", &self.sse_path)] {
            if !path.starts_with('/') {
                return Err(ConfigError::validation(format!(
                    "sse.{field} must start with '/', got '{path}'"
                )));
            }
        }
        if self.post_path == self.sse_path {
            return Err(ConfigError::validation(
                "sse.post_path and sse.sse_path must differ",
            ));
        }
        Ok(())
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            post_path: default_post_path(),
            sse_path: default_sse_path(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            poll_interval_ms: default_poll_interval(),
            keep_alive_window_secs: default_keep_alive_window(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_post_path() -> String {
    "/message".to_string()
}

fn default_sse_path() -> String {
    "/sse".to_string()
}

const fn default_heartbeat_interval() -> i64 {
    30
}

const fn default_poll_interval() -> u64 {
    100
}

#[allow(clippy::unnecessary_wraps)]
const fn default_keep_alive_window() -> Option<u64> {
    Some(60)
}

/// Session storage driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDriverKind {
    /// Files on local disk.
    #[default]
    File,
    /// A key-value store (Redis, or in-process with `memory://`).
    KeyValue,
}

/// Session storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Driver: "file" or "key_value".
    #[serde(default)]
    pub driver: SessionDriverKind,

    /// Session lifetime in seconds, extended on activity.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// File driver settings.
    #[serde(default)]
    pub file: FileSessionConfig,

    /// Key-value driver settings.
    #[serde(default)]
    pub key_value: KeyValueSessionConfig,
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.driver {
            SessionDriverKind::File => {
                if self.file.directory.as_os_str().is_empty() {
                    return Err(ConfigError::validation(
                        "session.file.directory must not be empty",
                    ));
                }
            }
            SessionDriverKind::KeyValue => {
                if self.key_value.prefix.is_empty() {
                    return Err(ConfigError::validation(
                        "session.key_value.prefix must not be empty",
                    ));
                }
                let schemes = ["redis://", "rediss://", "memory://"];
                if !schemes.iter().any(|s| self.key_value.url.starts_with(s)) {
                    return Err(ConfigError::validation(format!(
                        "Unsupported session.key_value.url '{}'. Must start with one of: {}",
                        self.key_value.url,
                        schemes.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            driver: SessionDriverKind::default(),
            ttl_secs: default_ttl(),
            file: FileSessionConfig::default(),
            key_value: KeyValueSessionConfig::default(),
        }
    }
}

const fn default_ttl() -> u64 {
    86_400
}

/// File driver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSessionConfig {
    /// Directory holding session files.
    #[serde(default = "default_session_dir")]
    pub directory: PathBuf,
}

impl Default for FileSessionConfig {
    fn default() -> Self {
        Self {
            directory: default_session_dir(),
        }
    }
}

fn default_session_dir() -> PathBuf {
    std::env::temp_dir().join("mcp-session-server").join("sessions")
}

/// Key-value driver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyValueSessionConfig {
    /// Store URL: `redis://`, `rediss://` or `memory://`.
    #[serde(default = "default_kv_url")]
    pub url: String,

    /// Prefix for every key the driver writes.
    #[serde(default = "default_kv_prefix")]
    pub prefix: String,
}

impl Default for KeyValueSessionConfig {
    fn default() -> Self {
        Self {
            url: default_kv_url(),
            prefix: default_kv_prefix(),
        }
    }
}

fn default_kv_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_kv_prefix() -> String {
    "mcp:".to_string()
}

/// Built-in tool selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Names of the built-in tools to register.
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
        }
    }
}

fn default_enabled_tools() -> Vec<String> {
    BUILTIN_TOOLS.iter().map(ToString::to_string).collect()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.transport.mode, TransportMode::Stdio);
        assert_eq!(config.session.driver, SessionDriverKind::File);
        assert_eq!(config.session.ttl_secs, 86_400);
        assert_eq!(config.tools.enabled, vec!["echo", "current_time"]);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": {
                "name": "test-server",
                "instructions": "Be brief.",
                "context": ["Tools are read-only."],
                "tool_timeout_secs": 5
            },
            "transport": { "mode": "sse" },
            "sse": {
                "bind_addr": "0.0.0.0:9000",
                "post_path": "/rpc",
                "sse_path": "/events",
                "heartbeat_interval_secs": 0,
                "poll_interval_ms": 50,
                "keep_alive_window_secs": 10
            },
            "session": {
                "driver": "key_value",
                "ttl_secs": 600,
                "key_value": { "url": "memory://", "prefix": "t:" }
            },
            "tools": { "enabled": ["echo"] },
            "logging": { "level": "debug" }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.name, "test-server");
        assert_eq!(config.server.tool_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.transport.mode, TransportMode::Sse);
        assert_eq!(config.sse.socket_addr().unwrap().port(), 9000);
        assert_eq!(config.sse.heartbeat_interval(), None);
        assert_eq!(config.sse.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.sse.keep_alive_window(), Some(Duration::from_secs(10)));
        assert_eq!(config.session.driver, SessionDriverKind::KeyValue);
        assert_eq!(config.session.key_value.prefix, "t:");
        assert_eq!(config.tools.enabled, vec!["echo"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn server_context_carries_instructions() {
        let config = ServerConfig {
            instructions: Some("Base".to_string()),
            context: vec!["Extra".to_string()],
            ..ServerConfig::default()
        };
        let context = config.server_context();
        assert_eq!(context.instructions().as_deref(), Some("Base\n\nExtra"));
        assert_eq!(context.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn sse_defaults() {
        let config = SseConfig::default();
        assert_eq!(config.heartbeat_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.keep_alive_window(), Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn null_keep_alive_window_disables_it() {
        let config: SseConfig =
            serde_json::from_str(r#"{"keep_alive_window_secs": null}"#).unwrap();
        assert_eq!(config.keep_alive_window(), None);
    }

    #[test]
    fn negative_heartbeat_disables() {
        let config = SseConfig {
            heartbeat_interval_secs: -5,
            ..SseConfig::default()
        };
        assert_eq!(config.heartbeat_interval(), None);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_zero_poll_interval() {
        let json = r#"{ "sse": { "poll_interval_ms": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_bad_bind_addr() {
        let json = r#"{ "sse": { "bind_addr": "localhost" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_empty_prefix() {
        let json = r#"{ "session": { "driver": "key_value", "key_value": { "prefix": "" } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_tool() {
        let json = r#"{ "tools": { "enabled": ["echo", "rm_rf"] } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rm_rf"));
    }

    #[test]
    fn reject_invalid_log_level() {
        let json = r#"{ "logging": { "level": "loud" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
