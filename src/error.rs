//! Error types for btblocklist.

use thiserror::Error;

/// Error type for btblocklist operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON decoding error
    #[error("JSON decoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A single source could not be probed
    #[error("probe of '{source_name}' failed: {message}")]
    Probe {
        source_name: String,
        message: String,
    },

    /// Merge or compression failed
    #[error("compilation failed: {0}")]
    Compile(String),

    /// Status sink rejected the summary
    #[error("status report failed: {0}")]
    Status(String),

    /// Invalid address range in a RIPE record
    #[error("invalid address range: {0}")]
    InvalidRange(String),

    /// A server answered with something we can't use
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl Error {
    /// Create a probe error for the named source.
    pub fn probe(source_name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Probe {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for btblocklist operations.
pub type Result<T> = std::result::Result<T, Error>;
