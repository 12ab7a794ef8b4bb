pub mod analyzer;
pub mod config;
pub mod error;
pub mod generator;
pub mod prompt;
pub mod protocol;
pub mod providers;
pub mod registry;
pub mod relay;
pub mod types;

// Re-exports for convenience
pub use analyzer::DocumentAnalyzer;
pub use config::{Credentials, Settings};
pub use error::{Error, Result};
pub use generator::{FragmentStream, Generation, StreamingGenerator};
pub use protocol::{SectionParser, Sections};
pub use providers::compatible::OpenAiCompatibleProvider;
pub use providers::{Capability, Provider, ProviderConfig, ProviderError};
pub use registry::ProviderRegistry;
pub use relay::ResponseRelay;
pub use types::*;
