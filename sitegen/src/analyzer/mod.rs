//! Turns an uploaded image or PDF into a textual website description via a
//! single non-streaming vision call.

pub mod pdf;
pub mod png;

use crate::error::{Error, Result};
use crate::providers::classify::is_auth_failure;
use crate::providers::{Provider, ProviderConfig};
use crate::registry::ProviderRegistry;
use crate::types::{ChatContext, ContentBlock, ImageContent, RequestOptions, UserMessage};
use bytes::Bytes;
use pdf::{PageRasterizer, PdfiumRasterizer};
use std::sync::Arc;

pub const IMAGE_ANALYSIS_PROMPT: &str = "Analyze this image and provide a concise description. \
Describe the main elements, colors, layout, and UI components. \
Identify what type of website or application this resembles. \
Focus on structural and visual elements that would be important for recreating the design.";

#[derive(Clone)]
pub struct DocumentAnalyzer {
    registry: ProviderRegistry,
    provider: Arc<dyn Provider>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl DocumentAnalyzer {
    /// Analyzer using the pdfium rasterizer configured in settings.
    pub fn new(registry: ProviderRegistry, provider: Arc<dyn Provider>) -> Self {
        let rasterizer = PdfiumRasterizer::new(registry.settings().pdfium_library_dir.clone());
        Self {
            registry,
            provider,
            rasterizer: Arc::new(rasterizer),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Describe an image. Any decodable format is accepted; the model always
    /// receives PNG.
    pub async fn analyze_image(&self, bytes: Bytes) -> Result<String> {
        let candidates = self.registry.vision_candidates()?;
        let image = blocking(move || png::normalize(&bytes)).await?;
        let context = vision_context(IMAGE_ANALYSIS_PROMPT.to_string(), Some(image));
        self.vision_call(candidates, &context).await
    }

    /// Describe a PDF from the text of all its pages plus a render of page one.
    pub async fn analyze_pdf(&self, bytes: Bytes) -> Result<String> {
        let candidates = self.registry.vision_candidates()?;
        let limit = self.registry.settings().pdf_text_limit;
        let rasterizer = Arc::clone(&self.rasterizer);

        let (prompt, image) = blocking(move || {
            let contents = pdf::extract(&bytes)?;
            let prompt = pdf::build_prompt(&contents, limit);
            if prompt.truncated {
                tracing::info!(
                    pages = contents.page_count(),
                    total_chars = prompt.total_chars,
                    limit,
                    "extracted PDF text exceeds the prompt ceiling, truncating"
                );
            }
            let image = match rasterizer.render_first_page(&bytes) {
                Ok(rgba) => Some(png::to_png_content(&image::DynamicImage::ImageRgba8(rgba))?),
                Err(e) => {
                    tracing::warn!("{}; analyzing PDF text only", e);
                    None
                }
            };
            Ok((prompt, image))
        })
        .await?;

        let context = vision_context(prompt.text, image);
        self.vision_call(candidates, &context).await
    }

    /// One vision call, with a single retry against a distinct fallback
    /// credential when the first is rejected.
    async fn vision_call(&self, candidates: Vec<ProviderConfig>, context: &ChatContext) -> Result<String> {
        let settings = self.registry.settings();
        let options = RequestOptions {
            temperature: Some(settings.vision_temperature),
            max_tokens: Some(settings.vision_max_tokens),
        };
        let mut candidates = candidates.into_iter();
        let primary = candidates
            .next()
            .ok_or_else(|| Error::Configuration("no vision provider configured".into()))?;

        tracing::info!(
            provider = %primary.name,
            model = %primary.model_id,
            key = %primary.masked_key(),
            "requesting document analysis"
        );
        let err = match self.provider.chat(&primary, context, &options).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        tracing::warn!(provider = %primary.name, "primary analysis failed: {}", err);

        match candidates.next() {
            Some(fallback) if is_auth_failure(&err) => {
                tracing::info!(provider = %fallback.name, model = %fallback.model_id, "attempting fallback provider for analysis");
                match self.provider.chat(&fallback, context, &options).await {
                    Ok(text) => {
                        tracing::info!(provider = %fallback.name, "fallback analysis succeeded");
                        Ok(text)
                    }
                    Err(fallback_err) => {
                        tracing::error!(provider = %fallback.name, "fallback analysis also failed: {}", fallback_err);
                        Err(Error::from_provider(fallback_err))
                    }
                }
            }
            _ => Err(Error::from_provider(err)),
        }
    }
}

fn vision_context(prompt: String, image: Option<ImageContent>) -> ChatContext {
    let mut content = vec![ContentBlock::text(prompt)];
    if let Some(image) = image {
        content.push(ContentBlock::Image(image));
    }
    ChatContext {
        system_prompt: None,
        messages: vec![UserMessage { content }],
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Document(format!("document processing failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::settings;
    use crate::providers::{ProviderError, TextStream};
    use async_trait::async_trait;
    use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
    use pdf::RasterError;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct VisionMock {
        replies: Mutex<VecDeque<std::result::Result<String, u16>>>,
        calls: Mutex<Vec<(ProviderConfig, ChatContext, RequestOptions)>>,
    }

    impl VisionMock {
        fn new(replies: Vec<std::result::Result<String, u16>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for VisionMock {
        async fn stream(
            &self,
            _target: &ProviderConfig,
            _context: &ChatContext,
            _options: &RequestOptions,
        ) -> std::result::Result<TextStream, ProviderError> {
            Err(ProviderError::Other("not used".into()))
        }

        async fn chat(
            &self,
            target: &ProviderConfig,
            context: &ChatContext,
            options: &RequestOptions,
        ) -> std::result::Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), context.clone(), options.clone()));
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(status)) => Err(ProviderError::Http {
                    status,
                    body: "denied".into(),
                }),
                None => Err(ProviderError::Other("no reply scripted".into())),
            }
        }
    }

    struct FakeRasterizer(bool);

    impl PageRasterizer for FakeRasterizer {
        fn render_first_page(&self, _pdf: &[u8]) -> std::result::Result<RgbaImage, RasterError> {
            if self.0 {
                Ok(RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255])))
            } else {
                Err(RasterError::Unavailable("no pdfium".into()))
            }
        }
    }

    fn analyzer(mock: &Arc<VisionMock>, primary: Option<&str>, fallback: Option<&str>, renders: bool) -> DocumentAnalyzer {
        DocumentAnalyzer::new(
            ProviderRegistry::new(settings(primary, fallback)),
            Arc::clone(mock) as Arc<dyn Provider>,
        )
        .with_rasterizer(Arc::new(FakeRasterizer(renders)))
    }

    fn jpeg() -> Bytes {
        let img = RgbImage::from_pixel(5, 5, Rgb([10, 120, 200]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn image_block(ctx: &ChatContext) -> Option<&ImageContent> {
        ctx.messages[0].content.iter().find_map(|b| match b {
            ContentBlock::Image(img) => Some(img),
            ContentBlock::Text(_) => None,
        })
    }

    #[tokio::test]
    async fn image_is_sent_as_png_with_vision_options() {
        let mock = VisionMock::new(vec![Ok("A landing page".into())]);
        let a = analyzer(&mock, Some("nvapi-a"), None, true);
        let text = a.analyze_image(jpeg()).await.unwrap();
        assert_eq!(text, "A landing page");

        let calls = mock.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (target, ctx, opts) = &calls[0];
        assert_eq!(target.model_id, "nvidia/llama-3.1-nemotron-nano-vl-8b-v1");
        assert_eq!(opts.max_tokens, Some(1000));
        assert_eq!(opts.temperature, Some(0.7));
        assert_eq!(ctx.user_text(), IMAGE_ANALYSIS_PROMPT);
        assert_eq!(image_block(ctx).unwrap().mime_type, "image/png");
    }

    #[tokio::test]
    async fn undecodable_image_fails_without_a_call() {
        let mock = VisionMock::new(vec![Ok("unused".into())]);
        let a = analyzer(&mock, Some("nvapi-a"), None, true);
        let err = a.analyze_image(Bytes::from_static(b"nope")).await.unwrap_err();
        assert!(matches!(err, Error::Document(_)));
        assert!(mock.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_keys_fail_before_any_call() {
        let mock = VisionMock::new(vec![]);
        let a = analyzer(&mock, None, None, true);
        assert!(matches!(a.analyze_image(jpeg()).await, Err(Error::Configuration(_))));
        assert!(mock.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_key_falls_back_once_with_same_payload() {
        let mock = VisionMock::new(vec![Err(403), Ok("from fallback".into())]);
        let a = analyzer(&mock, Some("nvapi-a"), Some("sk-or-b"), true);
        assert_eq!(a.analyze_image(jpeg()).await.unwrap(), "from fallback");

        let calls = mock.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0.name, "openrouter");
        assert_eq!(calls[1].0.model_id, "Qwen/Qwen2.5-VL-72B-Instruct");
        assert_eq!(calls[0].1, calls[1].1);
    }

    #[tokio::test]
    async fn server_errors_do_not_fall_back() {
        let mock = VisionMock::new(vec![Err(500), Ok("unused".into())]);
        let a = analyzer(&mock, Some("nvapi-a"), Some("sk-or-b"), true);
        assert!(matches!(a.analyze_image(jpeg()).await, Err(Error::Transport(_))));
        assert_eq!(mock.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pdf_prompt_covers_all_pages_and_attaches_first_page() {
        let mock = VisionMock::new(vec![Ok("Brochure site".into())]);
        let a = analyzer(&mock, Some("nvapi-a"), None, true);
        let bytes = pdf::tests::sample_pdf(&["Alpha", "Bravo", "Charlie"], Some("Acme"));
        assert_eq!(a.analyze_pdf(Bytes::from(bytes)).await.unwrap(), "Brochure site");

        let calls = mock.calls.lock().unwrap();
        let ctx = &calls[0].1;
        let text = ctx.user_text();
        for page in ["Alpha", "Bravo", "Charlie"] {
            assert!(text.contains(page), "missing {page}");
        }
        assert!(text.contains("--- Page 3 ---"));
        assert!(text.contains("- Total Pages: 3"));
        assert!(text.contains("- Title: Acme"));
        assert_eq!(image_block(ctx).unwrap().mime_type, "image/png");
    }

    #[tokio::test]
    async fn pdf_without_renderer_is_analyzed_from_text() {
        let mock = VisionMock::new(vec![Ok("ok".into())]);
        let a = analyzer(&mock, Some("nvapi-a"), None, false);
        let bytes = pdf::tests::sample_pdf(&["Only page"], None);
        a.analyze_pdf(Bytes::from(bytes)).await.unwrap();
        assert!(image_block(&mock.calls.lock().unwrap()[0].1).is_none());
    }

    #[tokio::test]
    async fn empty_pdf_is_reported_without_a_call() {
        let mock = VisionMock::new(vec![]);
        let a = analyzer(&mock, Some("nvapi-a"), None, true);
        let bytes = pdf::tests::sample_pdf(&[], None);
        let err = a.analyze_pdf(Bytes::from(bytes)).await.unwrap_err();
        assert_eq!(err.to_string(), "PDF is empty");
        assert!(mock.calls.lock().unwrap().is_empty());
    }
}
