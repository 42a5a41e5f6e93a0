//! Custom error types for the dump pipeline.

use thiserror::Error;

/// Errors that abort a run (or one extraction call).
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("API error: {0}")]
    Api(#[from] runalyze_client::RunalyzeError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DumpError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DumpError::Validation(msg.into())
    }
}

impl From<toml::de::Error> for DumpError {
    fn from(err: toml::de::Error) -> Self {
        DumpError::Config(err.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type DumpResult<T> = Result<T, DumpError>;
