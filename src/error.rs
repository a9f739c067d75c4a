//! Error types for the doctrace library
//!
//! Usage errors (invalid filter arguments, unreadable configuration) fail fast,
//! before any tracing starts. Errors raised by the traced program are data and
//! never appear here.

use thiserror::Error;

/// Errors raised while building call filters and presets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("depth threshold must be an integer")]
    NotAnInteger,

    #[error("depth threshold must be a positive integer, got '{0}'")]
    NegativeDepth(i64),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid filter expression: {0}. Expected one of: std, builtins, tests, modules=A,B, depth=N, pattern=/RE/")]
    InvalidExpression(String),
}

/// Errors raised while exporting a diagram
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize event log: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Diagram sink is still shared with a running tracer")]
    SinkInUse,
}

/// Errors raised while loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid filter configuration: {0}")]
    Filter(#[from] FilterError),
}
