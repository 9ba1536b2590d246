//! Error types for the evaluation toolkit.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while preparing, answering or scoring a dataset.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// The source dataset is malformed.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// An input item is missing one of its required fields.
    #[error("Item '{id}' is missing required field '{field}'")]
    DataIncomplete { id: String, field: &'static str },

    /// The result store exists but cannot be parsed. Never silently discarded.
    #[error("Result store at '{path}' is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// A category value that cannot be used as a numeric grouping key.
    #[error("Record '{id}' has non-numeric category {value}")]
    AggregationType { id: String, value: String },
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::LlmParse(err.to_string())
    }
}
