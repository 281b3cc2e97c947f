//! Error types for the fetch-and-stage core.

use thiserror::Error;

/// Errors raised by the session, executor and staging layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Login did not complete. Never retried.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An operation needed the HTTP client or browser before login finished
    /// (or after the session was closed).
    #[error("Session not ready: {0}")]
    SessionNotReady(&'static str),

    #[error("Could not find CSRF token in page")]
    TokenNotFound,

    /// The in-browser `fetch` reported an error.
    #[error("JavaScript fetch failed: {0}")]
    Fetch(String),

    /// JSON content type declared but no `<pre>` wrapper was found.
    #[error("Could not unwrap response body: {0}")]
    Unwrap(String),

    /// Service name that cannot be used as a staging file name.
    #[error("Invalid service name {0:?}: use only letters, digits, '.', '_' and '-'")]
    InvalidService(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(&'static str),

    #[error("Request to {url} failed with status code {status}")]
    Status { status: u16, url: String },

    #[error("Response body from {0} is empty")]
    EmptyResponse(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
