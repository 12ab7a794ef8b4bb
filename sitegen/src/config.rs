//! Process-wide settings: credentials from the environment, tunables from an
//! optional JSON file. Built once at startup and shared read-only.

use crate::providers::mask_key;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const NVIDIA_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Environment variable holding the mandatory generation key.
pub const PRIMARY_KEY_VAR: &str = "NVIDIA_API_KEY";
/// Environment variable holding the general fallback key.
pub const FALLBACK_KEY_VAR: &str = "OPENROUTER_API_KEY";
/// Environment variable holding the last-resort default key.
pub const DEFAULT_KEY_VAR: &str = "API_KEY";

/// API keys, read from the environment only. Empty values count as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub primary: Option<String>,
    pub fallback: Option<String>,
    pub default: Option<String>,
}

impl Credentials {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            primary: read(PRIMARY_KEY_VAR),
            fallback: read(FALLBACK_KEY_VAR),
            default: read(DEFAULT_KEY_VAR),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |k: &Option<String>| k.as_deref().map(mask_key);
        f.debug_struct("Credentials")
            .field("primary", &show(&self.primary))
            .field("fallback", &show(&self.fallback))
            .field("default", &show(&self.default))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    pub credentials: Credentials,

    pub nvidia_base_url: String,
    pub openrouter_base_url: String,

    /// Streaming generation model on the primary (NVIDIA) endpoint.
    pub generation_model: String,
    /// Streaming generation model on the fallback (OpenRouter) endpoint.
    pub fallback_generation_model: String,
    pub generation_max_tokens: u64,
    pub generation_temperature: f64,

    /// Vision model used when the vision key is an NVIDIA key.
    pub nvidia_vision_model: String,
    /// Vision model used against OpenRouter.
    pub openrouter_vision_model: String,
    pub vision_max_tokens: u64,
    pub vision_temperature: f64,

    /// Bound on opening a provider call (connect + response headers).
    pub connect_timeout_secs: u64,
    /// Bound on a whole non-streaming (vision) completion.
    pub response_timeout_secs: u64,
    /// Ceiling on extracted PDF text embedded in the analysis prompt.
    pub pdf_text_limit: usize,
    /// Upload size cap for the document endpoints.
    pub max_upload_bytes: usize,
    /// Directory containing the pdfium shared library. System search path when unset.
    pub pdfium_library_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            nvidia_base_url: NVIDIA_BASE_URL.into(),
            openrouter_base_url: OPENROUTER_BASE_URL.into(),
            generation_model: "moonshotai/kimi-k2-instruct-0905".into(),
            fallback_generation_model: "meta-llama/llama-3.1-405b-instruct".into(),
            generation_max_tokens: 85_000,
            generation_temperature: 0.2,
            nvidia_vision_model: "nvidia/llama-3.1-nemotron-nano-vl-8b-v1".into(),
            openrouter_vision_model: "Qwen/Qwen2.5-VL-72B-Instruct".into(),
            vision_max_tokens: 1000,
            vision_temperature: 0.7,
            connect_timeout_secs: 30,
            response_timeout_secs: 600,
            pdf_text_limit: 8000,
            max_upload_bytes: 20 * 1024 * 1024,
            pdfium_library_dir: None,
        }
    }
}

impl Settings {
    /// Default config file location (~/.sitegen/config.json).
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".sitegen").join("config.json")
    }

    /// Load settings: `.env` and process environment for credentials, the
    /// given JSON file (or the default one, if present) for tunables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Ok(env_path) = dotenvy::dotenv() {
            tracing::debug!("loaded environment from {}", env_path.display());
        }

        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let p = Self::default_path();
                if p.exists() {
                    Self::from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|k| std::env::var(k).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(settings)
    }

    /// Overlay credentials and endpoint overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.credentials = Credentials::from_lookup(&lookup);
        if let Some(url) = lookup("NVIDIA_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.nvidia_base_url = url.trim().to_string();
        }
        if let Some(url) = lookup("OPENROUTER_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.openrouter_base_url = url.trim().to_string();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("nvidia_base_url", &self.nvidia_base_url),
            ("openrouter_base_url", &self.openrouter_base_url),
        ] {
            let parsed = url::Url::parse(value)
                .with_context(|| format!("{} is not a valid URL: {}", name, value))?;
            anyhow::ensure!(
                matches!(parsed.scheme(), "http" | "https"),
                "{} must be an http(s) URL: {}",
                name,
                value
            );
        }
        anyhow::ensure!(self.connect_timeout_secs > 0, "connect_timeout_secs must be positive");
        anyhow::ensure!(self.response_timeout_secs > 0, "response_timeout_secs must be positive");
        anyhow::ensure!(self.pdf_text_limit > 0, "pdf_text_limit must be positive");
        Ok(())
    }
}
