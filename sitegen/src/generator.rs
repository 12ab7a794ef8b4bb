//! Streaming generation: primary call, single fallback on authorization
//! failure, then live relay of text fragments.
//!
//! ```text
//! INIT ─► CALLING_PRIMARY ─► STREAMING ─► DONE
//!   │            │               │
//!   │            └► CALLING_FALLBACK ─► STREAMING
//!   ▼            ▼               ▼
//! FAILED      FAILED       Interrupted fragment (in-band)
//! ```

use crate::error::{Error, Result};
use crate::prompt;
use crate::providers::classify::is_auth_failure;
use crate::providers::{Provider, ProviderConfig, TextStream};
use crate::registry::ProviderRegistry;
use crate::types::{ChatContext, GenerationRequest, RequestOptions, StreamFragment};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// Fragments of one generation, in provider order. Ends after the provider
/// finishes or after a single [`StreamFragment::Interrupted`].
pub type FragmentStream = BoxStream<'static, StreamFragment>;

/// An established generation: which provider answered, and its fragments.
pub struct Generation {
    pub provider: ProviderConfig,
    pub used_fallback: bool,
    pub fragments: FragmentStream,
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("provider", &self.provider)
            .field("used_fallback", &self.used_fallback)
            .finish_non_exhaustive()
    }
}

/// Holds no per-request state; every call to [`StreamingGenerator::generate`]
/// is independent.
#[derive(Clone)]
pub struct StreamingGenerator {
    registry: ProviderRegistry,
    provider: Arc<dyn Provider>,
}

impl StreamingGenerator {
    pub fn new(registry: ProviderRegistry, provider: Arc<dyn Provider>) -> Self {
        Self { registry, provider }
    }

    fn options(&self) -> RequestOptions {
        let s = self.registry.settings();
        RequestOptions {
            temperature: Some(s.generation_temperature),
            max_tokens: Some(s.generation_max_tokens),
        }
    }

    /// Validate the request, build the prompt and open the stream.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        if request.topic().trim().is_empty() {
            return Err(Error::Validation("Prompt is required".into()));
        }
        let context = prompt::build(request).into_context();
        self.generate_with_context(&context).await
    }

    /// Open a generation stream for an already-built conversation.
    pub async fn generate_with_context(&self, context: &ChatContext) -> Result<Generation> {
        // INIT: fails before any I/O when no primary credential exists.
        let candidates = self.registry.generation_candidates()?;
        let mut candidates = candidates.into_iter();
        let primary = candidates
            .next()
            .ok_or_else(|| Error::Configuration("no generation provider configured".into()))?;
        let fallback = candidates.next();
        let options = self.options();

        // CALLING_PRIMARY
        tracing::info!(
            provider = %primary.name,
            model = %primary.model_id,
            key = %primary.masked_key(),
            "opening generation stream"
        );
        let (provider, used_fallback, stream) =
            match self.provider.stream(&primary, context, &options).await {
                Ok(stream) => (primary, false, stream),
                Err(err) => {
                    tracing::warn!(provider = %primary.name, "primary generation failed: {}", err);
                    match fallback {
                        Some(fallback) if is_auth_failure(&err) => {
                            // CALLING_FALLBACK: exactly one retry, same messages.
                            tracing::info!(
                                provider = %fallback.name,
                                model = %fallback.model_id,
                                "attempting fallback provider for generation"
                            );
                            match self.provider.stream(&fallback, context, &options).await {
                                Ok(stream) => {
                                    tracing::info!(provider = %fallback.name, "fallback provider accepted the request");
                                    (fallback, true, stream)
                                }
                                Err(fallback_err) => {
                                    tracing::error!(
                                        provider = %fallback.name,
                                        "fallback generation also failed: {}",
                                        fallback_err
                                    );
                                    return Err(Error::from_provider(fallback_err));
                                }
                            }
                        }
                        _ => return Err(Error::from_provider(err)),
                    }
                }
            };

        Ok(Generation {
            fragments: into_fragments(stream, provider.name.clone()),
            provider,
            used_fallback,
        })
    }
}

/// STREAMING: map provider deltas to fragments. The first mid-stream error
/// becomes a terminal in-band fragment and nothing is read after it.
fn into_fragments(mut inner: TextStream, provider: String) -> FragmentStream {
    let s = async_stream::stream! {
        let mut count: usize = 0;
        while let Some(item) = inner.next().await {
            match item {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    count += 1;
                    yield StreamFragment::Text(text);
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::error!(provider = %provider, fragments = count, "{}", Error::MidStream(e));
                    yield StreamFragment::Interrupted(reason);
                    return;
                }
            }
        }
        tracing::debug!(provider = %provider, fragments = count, "generation stream finished");
    };
    Box::pin(s)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{Credentials, Settings};
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Outcome of one scripted `stream` call.
    pub(crate) enum Script {
        Reject(u16),
        Fragments(Vec<std::result::Result<String, u16>>),
    }

    /// Provider double: replays scripted outcomes and counts calls and reads.
    pub(crate) struct MockProvider {
        scripts: Mutex<VecDeque<Script>>,
        pub calls: Mutex<Vec<(ProviderConfig, ChatContext)>>,
        pub reads: Arc<AtomicUsize>,
    }

    impl MockProvider {
        pub(crate) fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                calls: Mutex::new(Vec::new()),
                reads: Arc::new(AtomicUsize::new(0)),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        async fn stream(
            &self,
            target: &ProviderConfig,
            context: &ChatContext,
            _options: &RequestOptions,
        ) -> std::result::Result<TextStream, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), context.clone()));
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Fragments(Vec::new()));
            match script {
                Script::Reject(status) => Err(ProviderError::Http {
                    status,
                    body: "rejected".into(),
                }),
                Script::Fragments(items) => {
                    let reads = Arc::clone(&self.reads);
                    let s = async_stream::stream! {
                        for item in items {
                            reads.fetch_add(1, Ordering::SeqCst);
                            yield item.map_err(|status| ProviderError::Http {
                                status,
                                body: "stream broke".into(),
                            });
                        }
                    };
                    Ok(Box::pin(s))
                }
            }
        }

        async fn chat(
            &self,
            target: &ProviderConfig,
            context: &ChatContext,
            _options: &RequestOptions,
        ) -> std::result::Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), context.clone()));
            Ok(String::new())
        }
    }

    pub(crate) fn settings(primary: Option<&str>, fallback: Option<&str>) -> Arc<Settings> {
        Arc::new(Settings {
            credentials: Credentials {
                primary: primary.map(String::from),
                fallback: fallback.map(String::from),
                default: None,
            },
            ..Settings::default()
        })
    }

    fn generator(mock: &Arc<MockProvider>, primary: Option<&str>, fallback: Option<&str>) -> StreamingGenerator {
        StreamingGenerator::new(
            ProviderRegistry::new(settings(primary, fallback)),
            Arc::clone(mock) as Arc<dyn Provider>,
        )
    }

    fn texts(items: &[&str]) -> Script {
        Script::Fragments(items.iter().map(|s| Ok(s.to_string())).collect())
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_before_any_call() {
        let mock = MockProvider::new(vec![]);
        let gen_ = generator(&mock, Some("nvapi-a"), None);
        for prompt in ["", "   ", "\n\t"] {
            let err = gen_.generate(&GenerationRequest::from_prompt(prompt)).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_primary_key_fails_before_any_call() {
        let mock = MockProvider::new(vec![]);
        let gen_ = generator(&mock, None, Some("sk-or-b"));
        let err = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn bakery_prompt_streams_verbatim_from_primary() {
        let mock = MockProvider::new(vec![texts(&[
            "===ANALYSIS_START===",
            "A bakery",
            "===ANALYSIS_END===",
        ])]);
        let gen_ = generator(&mock, Some("nvapi-a"), Some("sk-or-b"));
        let generation = gen_
            .generate(&GenerationRequest::from_prompt("bakery website with phone 555-1234"))
            .await
            .unwrap();
        assert!(!generation.used_fallback);
        assert_eq!(generation.provider.name, "nvidia");

        let frags: Vec<StreamFragment> = generation.fragments.collect().await;
        assert_eq!(
            frags,
            vec![
                StreamFragment::Text("===ANALYSIS_START===".into()),
                StreamFragment::Text("A bakery".into()),
                StreamFragment::Text("===ANALYSIS_END===".into()),
            ]
        );
        assert!(frags.iter().all(|f| !f.is_terminal()));

        let calls = mock.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.api_key, "nvapi-a");
        assert!(calls[0].1.user_text().contains("555-1234"));
    }

    #[tokio::test]
    async fn auth_failure_falls_back_exactly_once_with_same_messages() {
        for status in [401, 403] {
            let mock = MockProvider::new(vec![Script::Reject(status), texts(&["ok"])]);
            let gen_ = generator(&mock, Some("nvapi-a"), Some("sk-or-b"));
            let generation = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap();
            assert!(generation.used_fallback);
            assert_eq!(generation.provider.name, "openrouter");

            let calls = mock.calls.lock().unwrap();
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[1].0.api_key, "sk-or-b");
            assert_eq!(calls[0].1, calls[1].1);
        }
    }

    #[tokio::test]
    async fn auth_failure_without_fallback_is_surfaced() {
        let mock = MockProvider::new(vec![Script::Reject(401)]);
        let gen_ = generator(&mock, Some("nvapi-a"), None);
        let err = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn non_auth_failure_does_not_fall_back() {
        let mock = MockProvider::new(vec![Script::Reject(500), texts(&["never"])]);
        let gen_ = generator(&mock, Some("nvapi-a"), Some("sk-or-b"));
        let err = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn fallback_failure_is_final() {
        let mock = MockProvider::new(vec![Script::Reject(403), Script::Reject(401), texts(&["x"])]);
        let gen_ = generator(&mock, Some("nvapi-a"), Some("sk-or-b"));
        let err = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn client_disconnect_stops_provider_reads() {
        let items: Vec<&str> = vec!["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
        let mock = MockProvider::new(vec![texts(&items)]);
        let gen_ = generator(&mock, Some("nvapi-a"), None);
        let generation = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap();

        let mut relay = crate::relay::ResponseRelay::new(generation.fragments, "disconnect");
        assert_eq!(relay.next().await.unwrap().unwrap(), "0".as_bytes());
        assert_eq!(relay.next().await.unwrap().unwrap(), "1".as_bytes());
        drop(relay);

        assert_eq!(mock.reads.load(Ordering::SeqCst), 2);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_becomes_terminal_fragment_without_retry() {
        let mock = MockProvider::new(vec![Script::Fragments(vec![
            Ok("<html>".into()),
            Err(502),
            Ok("never read".into()),
        ])]);
        let gen_ = generator(&mock, Some("nvapi-a"), Some("sk-or-b"));
        let generation = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap();
        let frags: Vec<StreamFragment> = generation.fragments.collect().await;

        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0], StreamFragment::Text("<html>".into()));
        match &frags[1] {
            StreamFragment::Interrupted(reason) => assert!(reason.contains("502")),
            other => panic!("unexpected fragment {other:?}"),
        }
        assert_eq!(mock.reads.load(Ordering::SeqCst), 2);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_deltas_are_skipped() {
        let mock = MockProvider::new(vec![texts(&["a", "", "b"])]);
        let gen_ = generator(&mock, Some("nvapi-a"), None);
        let generation = gen_.generate(&GenerationRequest::from_prompt("site")).await.unwrap();
        let frags: Vec<StreamFragment> = generation.fragments.collect().await;
        assert_eq!(
            frags,
            vec![StreamFragment::Text("a".into()), StreamFragment::Text("b".into())]
        );
    }

    #[tokio::test]
    async fn sequential_calls_are_independent() {
        let mock = MockProvider::new(vec![texts(&["one"]), texts(&["one"])]);
        let gen_ = generator(&mock, Some("nvapi-a"), None);
        let req = GenerationRequest::from_prompt("same prompt");

        let first: Vec<StreamFragment> = gen_.generate(&req).await.unwrap().fragments.collect().await;
        let second: Vec<StreamFragment> = gen_.generate(&req).await.unwrap().fragments.collect().await;
        assert_eq!(first, second);

        let calls = mock.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }
}
