//! Error types for quick

use thiserror::Error;

/// Main error type for quick
///
/// Every variant here is fatal: it crosses back to the CLI and ends the
/// process with a non-zero exit. Per-request failures during a benchmark are
/// [`crate::client::TransportError`]s and are recorded as data instead.
#[derive(Error, Debug)]
pub enum QuickError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("{0}")]
    Argument(String),

    #[error("{0}")]
    Body(String),

    #[error("{0}")]
    Cookie(String),

    #[error("{0}")]
    Resolve(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Connection(String),

    #[error("SSL error: {0}")]
    Ssl(String),

    #[error("Benchmark worker failed: {0}")]
    Worker(String),
}

impl From<crate::client::TransportError> for QuickError {
    fn from(err: crate::client::TransportError) -> Self {
        QuickError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuickError>;
