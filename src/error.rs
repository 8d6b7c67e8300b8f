//! Error types for mcp-session-server.
//!
//! Protocol failures never appear here: they are formatted into JSON-RPC
//! error envelopes by the dispatcher. These types cover configuration,
//! tool execution, session storage and server startup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// Errors raised by a tool handler.
///
/// These are application-level failures: the dispatcher reports them to the
/// client as a successful call whose result is flagged `isError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// A required argument was not supplied.
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    /// An argument could not be bound to its declared type.
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// Argument name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The tool ran but failed.
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Creates a generic failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an invalid-argument failure.
    #[must_use]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised inside a session storage driver.
///
/// Drivers log these and report a boolean failure to their callers; they are
/// never surfaced to clients.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialised.
    #[error("session data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The per-session lock could not be acquired.
    #[error("failed to lock session {session_id}")]
    Lock {
        /// Session whose lock failed.
        session_id: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The session id is not safe to use as a storage key.
    #[error("invalid session id")]
    InvalidSessionId,

    /// The key-value backend reported an error.
    #[error("key-value backend error: {0}")]
    Backend(String),

    /// A blocking storage task was cancelled or panicked.
    #[error("session storage task failed: {0}")]
    Task(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Errors that stop the server from starting or running.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The session store could not be opened.
    #[error("failed to open session store: {0}")]
    Store(#[from] StoreError),

    /// A transport failed.
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
