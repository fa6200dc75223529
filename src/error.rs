//! Error types for map rendering and the forward proxy

use thiserror::Error;

/// Result type alias for rendering and proxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a map or proxying a request
#[derive(Error, Debug)]
pub enum Error {
    /// A required invocation parameter was absent
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// Non-success HTTP status on a definition or tile fetch
    #[error("Cannot read {url} (status {status})")]
    Fetch { url: String, status: u16 },

    /// Malformed JSON definition or extent
    #[error("Parse error: {0}")]
    Parse(String),

    /// Layer class tag with no renderer; never fatal for a run
    #[error("Unsupported layer className {0}")]
    UnsupportedLayer(String),

    /// The proxy could not reach the upstream server
    #[error("Upstream error ({status}): {message}")]
    ProxyUpstream { status: u16, message: String },

    /// Proxied request body over the size limit or unreadable
    #[error("Request body rejected: {0}")]
    RequestBody(String),

    /// Transport-level failure (connection refused, timeout, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Surface allocation, decoding or compositing failed
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}
