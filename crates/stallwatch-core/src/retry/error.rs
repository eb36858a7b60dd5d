//! Error type for a single HTTP exchange with a transfer client or queue owner.

/// Error returned by one request (curl failure, HTTP error, or unreadable body).
/// Kept typed so callers can classify it for retries before converting to anyhow.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Curl reported an error (timeout, connection refused, DNS, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {status}")]
    Http { status: u32, body: String },
    /// Response body was not the JSON shape we expected.
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// Login endpoint answered but refused the credentials.
    #[error("credentials rejected")]
    AuthRejected,
    /// Endpoint URL could not be built from the configured base.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RequestError {
    /// HTTP status if the server answered with a non-success code.
    pub fn status(&self) -> Option<u32> {
        match self {
            RequestError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
