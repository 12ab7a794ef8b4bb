use crate::providers::ProviderError;
use crate::providers::classify::{FailureClass, classify};

/// Failures surfaced by the orchestration layer.
///
/// Every provider failure is converted into one of these kinds before it
/// leaves the crate; callers never see a raw transport error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable provider credential. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing or empty required input. Rejected before any provider call.
    #[error("{0}")]
    Validation(String),

    /// An uploaded document could not be decoded.
    #[error("{0}")]
    Document(String),

    /// The provider rejected the credential (after any fallback attempt).
    #[error("provider rejected credentials: {0}")]
    Authorization(#[source] ProviderError),

    /// Network, timeout or non-auth HTTP failure before any content arrived.
    #[error("provider request failed: {0}")]
    Transport(#[source] ProviderError),

    /// Failure after partial content was delivered.
    #[error("stream interrupted: {0}")]
    MidStream(#[source] ProviderError),
}

impl Error {
    /// Convert a call-establishment failure into its orchestration kind.
    pub fn from_provider(err: ProviderError) -> Self {
        match classify(&err) {
            FailureClass::Authorization => Error::Authorization(err),
            FailureClass::Transport => Error::Transport(err),
        }
    }

    /// Short machine-readable name of the kind, used in logs and JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Validation(_) => "validation",
            Error::Document(_) => "document",
            Error::Authorization(_) => "authorization",
            Error::Transport(_) => "transport",
            Error::MidStream(_) => "mid_stream",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
