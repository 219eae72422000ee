use crate::types::Provider;
use std::time::Duration;
use thiserror::Error;

/// Error types for provider and authenticated calls.
///
/// Every failure is tagged with what kind of recovery it calls for. Only a few of
/// these ever reach application code:
///
/// - [`AtlasError::RateLimited`] is absorbed by the [`RequestQueue`](crate::RequestQueue),
///   which pauses and re-queues the call.
/// - [`AtlasError::Transport`] and [`AtlasError::Application`] are logged and degraded to
///   empty results by the provider clients.
/// - [`AtlasError::SessionExpired`] is returned from the authenticated path so the caller
///   can force a re-login.
///
/// # Error Handling Examples
///
/// ```rust,no_run
/// # use artist_atlas::{AtlasClient, AtlasConfig, AtlasError};
/// # tokio_test::block_on(async {
/// let client = AtlasClient::new(
///     Box::new(http_client::native::NativeClient::new()),
///     AtlasConfig::from_env(),
/// )?;
///
/// match client.auth().get_json::<serde_json::Value>("/api/maps").await {
///     Ok(maps) => println!("{maps}"),
///     Err(AtlasError::SessionExpired(reason)) => eprintln!("Please log in again: {reason}"),
///     Err(e) => eprintln!("Request failed: {e}"),
/// }
/// # Ok::<(), AtlasError>(())
/// # });
/// ```
#[derive(Error, Debug)]
pub enum AtlasError {
    /// HTTP/network related errors.
    ///
    /// Covers send failures (no `status`) and non-2xx responses other than 401 and 429.
    #[error("Transport error (status {status:?}): {message}")]
    Transport {
        /// HTTP status, when a response was received at all
        status: Option<u16>,
        /// Short description or body excerpt
        message: String,
    },

    /// The provider asked us to slow down.
    ///
    /// Raised for HTTP 429 and for provider throttling codes embedded in a 2xx body.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Provider supplied delay, if any
        retry_after: Option<Duration>,
    },

    /// A 2xx response whose body carried an `error` object.
    #[error("{provider} returned error {code}: {message}")]
    Application {
        /// Which provider answered
        provider: Provider,
        /// Provider specific error code
        code: i64,
        /// Provider supplied message
        message: String,
    },

    /// HTTP 401 on a call that will not (or can no longer) be recovered by a refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credential refresh failed; the user must authenticate again.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The queued call was dropped by [`RequestQueue::flush`](crate::RequestQueue::flush)
    /// before it was dispatched.
    #[error("Request cancelled before dispatch")]
    Cancelled,

    /// Failed to parse a response body.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Invalid configuration, usually a malformed URL.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors, raised by the token store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`AtlasError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    RateLimited,
    Application,
    Unauthorized,
    SessionExpired,
    Cancelled,
    Parse,
    Config,
    Io,
}

impl AtlasError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AtlasError::Transport { .. } => ErrorKind::Transport,
            AtlasError::RateLimited { .. } => ErrorKind::RateLimited,
            AtlasError::Application { .. } => ErrorKind::Application,
            AtlasError::Unauthorized(_) => ErrorKind::Unauthorized,
            AtlasError::SessionExpired(_) => ErrorKind::SessionExpired,
            AtlasError::Cancelled => ErrorKind::Cancelled,
            AtlasError::Parse(_) => ErrorKind::Parse,
            AtlasError::Config(_) => ErrorKind::Config,
            AtlasError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the request queue should pause and re-queue on this error.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AtlasError::RateLimited { .. })
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        AtlasError::Transport {
            status: None,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AtlasError {
    fn from(e: serde_json::Error) -> Self {
        AtlasError::Parse(e.to_string())
    }
}
