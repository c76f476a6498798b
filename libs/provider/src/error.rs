//! Error types for provider calls.

use thiserror::Error;

/// Errors returned by provider implementations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transient failure worth retrying (network hiccup, throttling,
    /// eventual-consistency gap).
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider rejected the request.
    #[error("provider api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response could not be interpreted.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            // Throttling and server-side failures clear on their own.
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transient(err.to_string())
    }
}
