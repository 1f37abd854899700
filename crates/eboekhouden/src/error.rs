use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors raised while talking to the bookkeeping service.
///
/// The split between transient and permanent failures drives the retry
/// policy: only [`is_transient`](ClientError::is_transient) errors are
/// ever retried.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-layer failure (connect, timeout, broken body).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service rejected our credentials or session.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The service asked us to slow down.
    #[error("rate limited")]
    RateLimited,
    /// Unexpected HTTP status or malformed payload.
    #[error("protocol error (status {status}): {message}")]
    Protocol { status: u16, message: String },
    /// The legacy XML envelope could not be parsed.
    #[error("xml error: {0}")]
    Xml(String),
    /// Client-side misconfiguration (bad URL, missing credentials).
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether a retry with backoff can reasonably succeed.
    ///
    /// Auth failures are excluded: the client already performs a single
    /// transparent re-authentication, so an `Auth` error that reaches the
    /// caller is final.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited => true,
            Self::Protocol { status, .. } => *status >= 500,
            Self::Auth(_) | Self::Xml(_) | Self::Config(_) => false,
        }
    }
}

impl From<quick_xml::Error> for ClientError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}
