//! Failure classification for provider calls: decides whether a failed call
//! may be retried once against a fallback provider.

use super::ProviderError;

/// How a failed provider call should be treated by the orchestration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The provider rejected the credential (401/403). Eligible for fallback.
    Authorization,
    /// Anything else: network, timeouts, other statuses, bad payloads.
    Transport,
}

/// True if the status is in the authorization/permission class.
pub fn is_auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

/// Classify a provider error by its type and status code.
pub fn classify(err: &ProviderError) -> FailureClass {
    match err {
        ProviderError::Http { status, .. } if is_auth_status(*status) => {
            FailureClass::Authorization
        }
        ProviderError::Network(e) => match e.status() {
            Some(status) if is_auth_status(status.as_u16()) => FailureClass::Authorization,
            _ => FailureClass::Transport,
        },
        ProviderError::AuthRequired(_) => FailureClass::Authorization,
        _ => FailureClass::Transport,
    }
}

/// True if the error allows a single retry against a fallback provider.
pub fn is_auth_failure(err: &ProviderError) -> bool {
    classify(err) == FailureClass::Authorization
}
