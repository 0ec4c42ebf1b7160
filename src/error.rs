//! Error types for the compatibility checker

use std::path::PathBuf;

use thiserror::Error;

/// Result type for checker operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// A schema signature that does not conform to the schema grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset} in `{text}`")]
pub struct ParseError {
    /// Human-readable description of what was expected
    pub message: String,
    /// Byte offset into `text` where parsing stopped
    pub offset: usize,
    /// The rejected signature
    pub text: String,
}

/// Checker errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to parse schema on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("Failed to parse schema at {}:{line}: {source}", path.display())]
    ParseFile {
        path: PathBuf,
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("Invalid exemption pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid expiry date `{date}` for pattern `{pattern}`")]
    InvalidDate { pattern: String, date: String },

    #[error("Duplicate schema in current snapshot: {0}")]
    DuplicateSchema(String),

    #[error("Invalid version map entry {key}: {source}")]
    VersionMap {
        key: String,
        #[source]
        source: ParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
