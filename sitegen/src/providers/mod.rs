pub mod classify;
pub mod compatible;
pub mod sanitize;

use crate::types::{ChatContext, RequestOptions};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Timed out after {0}s waiting for the provider")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

/// What a provider endpoint can be used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub vision: bool,
    pub streaming: bool,
}

impl Capability {
    pub const STREAMING: Capability = Capability {
        vision: false,
        streaming: true,
    };
    pub const VISION: Capability = Capability {
        vision: true,
        streaming: false,
    };

    /// True if every capability set in `required` is also set here.
    pub fn satisfies(&self, required: Capability) -> bool {
        (!required.vision || self.vision) && (!required.streaming || self.streaming)
    }
}

/// One hosted endpoint + credential + model, as resolved by the registry.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub model_id: String,
    pub capability: Capability,
}

impl ProviderConfig {
    /// Short, log-safe form of the credential.
    pub fn masked_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.masked_key())
            .field("model_id", &self.model_id)
            .field("capability", &self.capability)
            .finish()
    }
}

const MASK_VISIBLE_CHARS: usize = 10;

/// First ten characters of a key followed by `...`. Keys too short to keep
/// anything hidden are masked entirely.
pub fn mask_key(key: &str) -> String {
    if key.chars().count() <= MASK_VISIBLE_CHARS {
        return "***".to_string();
    }
    let prefix: String = key.chars().take(MASK_VISIBLE_CHARS).collect();
    format!("{}...", prefix)
}

/// Text deltas of an established streaming completion, in provider order.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// Transport to a chat-completion API.
///
/// Implementations are stateless with respect to any single request: the
/// target endpoint and credential arrive with every call, so one instance is
/// shared by every concurrent flow.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open a streaming chat completion.
    ///
    /// Resolves once the provider accepted the request (status checked,
    /// headers received). Failures here are call-establishment failures;
    /// errors yielded by the returned stream happened mid-stream. Dropping the
    /// stream releases the underlying connection.
    async fn stream(
        &self,
        target: &ProviderConfig,
        context: &ChatContext,
        options: &RequestOptions,
    ) -> Result<TextStream, ProviderError>;

    /// Execute a chat completion (non-streaming) and return the reply text.
    async fn chat(
        &self,
        target: &ProviderConfig,
        context: &ChatContext,
        options: &RequestOptions,
    ) -> Result<String, ProviderError>;
}
