use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type used throughout the SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the SDK.
///
/// Toggle evaluation itself never fails: problems with user data or toggle definitions resolve to
/// the caller's default value and are reported through the `reason` of the evaluation. The errors
/// below come from construction, synchronization, and event delivery.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Client was created with an empty or whitespace-only SDK key.
    #[error("sdk key must not be blank")]
    BlankSdkKey,

    /// The SDK key contains characters that cannot be sent in an HTTP header.
    #[error("sdk key contains invalid characters")]
    InvalidSdkKey,

    /// A string could not be parsed as a semantic version.
    #[error("bad semantic version representation '{0}'")]
    InvalidSemVer(String),

    /// One of the configured URLs is invalid.
    #[error("invalid url configuration")]
    InvalidUrl(#[source] url::ParseError),

    /// The server rejected the SDK key.
    #[error("unauthorized, sdk key is likely invalid")]
    Unauthorized,

    /// The server answered with a non-success status.
    #[error("http request error: {0}")]
    Http(StatusCode),

    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    /// An I/O error.
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Malformed repository JSON.
    #[error("error parsing repository: {0}")]
    Json(Arc<serde_json::Error>),

    /// The synchronizer thread panicked. This should normally never happen.
    #[error("synchronizer thread panicked")]
    SynchronizerThreadPanicked,

    /// The event processor thread panicked. This should normally never happen.
    #[error("event processor thread panicked")]
    EventProcessorThreadPanicked,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(Arc::new(value))
    }
}
