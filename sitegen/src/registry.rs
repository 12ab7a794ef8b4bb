//! Resolves which endpoint/credential/model triples to try, in priority order.

use crate::config::{PRIMARY_KEY_VAR, Settings};
use crate::error::{Error, Result};
use crate::providers::{Capability, ProviderConfig};
use std::sync::Arc;

/// Key prefix identifying NVIDIA NIM credentials.
const NVIDIA_KEY_PREFIX: &str = "nvapi-";

/// Pure lookup over the loaded settings. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    settings: Arc<Settings>,
}

impl ProviderRegistry {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ordered candidates for a capability, primary first.
    pub fn candidates(&self, required: Capability) -> Result<Vec<ProviderConfig>> {
        let all = if required.vision {
            self.vision_candidates()?
        } else {
            self.generation_candidates()?
        };
        Ok(all
            .into_iter()
            .filter(|c| c.capability.satisfies(required))
            .collect())
    }

    /// Streaming generation: the primary key is mandatory; the OpenRouter key,
    /// when set and distinct, is the single fallback.
    pub fn generation_candidates(&self) -> Result<Vec<ProviderConfig>> {
        let s = &self.settings;
        let primary_key = s.credentials.primary.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "No valid generation API key found. Please set {} in your environment or .env file.",
                PRIMARY_KEY_VAR
            ))
        })?;

        let mut out = vec![ProviderConfig {
            name: "nvidia".into(),
            base_url: s.nvidia_base_url.clone(),
            api_key: primary_key.to_string(),
            model_id: s.generation_model.clone(),
            capability: Capability::STREAMING,
        }];

        if let Some(fallback_key) = self.distinct_fallback_key(primary_key) {
            out.push(ProviderConfig {
                name: "openrouter".into(),
                base_url: s.openrouter_base_url.clone(),
                api_key: fallback_key.to_string(),
                model_id: s.fallback_generation_model.clone(),
                capability: Capability::STREAMING,
            });
        }
        Ok(out)
    }

    /// Vision analysis: first non-empty of primary, fallback, default key.
    /// The endpoint follows the key: NVIDIA keys go to NVIDIA, anything else
    /// to OpenRouter.
    pub fn vision_candidates(&self) -> Result<Vec<ProviderConfig>> {
        let s = &self.settings;
        let creds = &s.credentials;
        let key = creds
            .primary
            .as_deref()
            .or(creds.fallback.as_deref())
            .or(creds.default.as_deref())
            .ok_or_else(|| {
                Error::Configuration(
                    "No valid API key found. Please set NVIDIA_API_KEY or OPENROUTER_API_KEY in your .env file."
                        .into(),
                )
            })?;

        let mut out = vec![self.vision_target(key)];
        if let Some(fallback_key) = self.distinct_fallback_key(key) {
            out.push(self.openrouter_vision(fallback_key));
        }
        Ok(out)
    }

    fn vision_target(&self, key: &str) -> ProviderConfig {
        if key.starts_with(NVIDIA_KEY_PREFIX) {
            ProviderConfig {
                name: "nvidia".into(),
                base_url: self.settings.nvidia_base_url.clone(),
                api_key: key.to_string(),
                model_id: self.settings.nvidia_vision_model.clone(),
                capability: Capability::VISION,
            }
        } else {
            self.openrouter_vision(key)
        }
    }

    fn openrouter_vision(&self, key: &str) -> ProviderConfig {
        ProviderConfig {
            name: "openrouter".into(),
            base_url: self.settings.openrouter_base_url.clone(),
            api_key: key.to_string(),
            model_id: self.settings.openrouter_vision_model.clone(),
            capability: Capability::VISION,
        }
    }

    fn distinct_fallback_key(&self, selected: &str) -> Option<&str> {
        self.settings
            .credentials
            .fallback
            .as_deref()
            .filter(|k| *k != selected)
    }
}
