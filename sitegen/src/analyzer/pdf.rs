//! PDF reading: per-page text, metadata, and first-page rasterization.

use crate::error::{Error, Result};
use image::RgbaImage;
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Zoom applied when rendering the first page.
pub const RENDER_SCALE: f32 = 2.0;

/// Text and metadata pulled out of an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfContents {
    pub page_texts: Vec<String>,
    pub title: Option<String>,
}

impl PdfContents {
    pub fn page_count(&self) -> usize {
        self.page_texts.len()
    }

    /// Every page's text in order, each preceded by a `--- Page N ---` label.
    pub fn labeled_text(&self) -> String {
        let mut out = String::new();
        for (i, text) in self.page_texts.iter().enumerate() {
            out.push_str(&format!("--- Page {} ---\n", i + 1));
            out.push_str(text.trim_end());
            out.push_str("\n\n");
        }
        out
    }
}

/// Parse a PDF and extract its text and title.
///
/// CPU-bound; run it off the async runtime.
pub fn extract(bytes: &[u8]) -> Result<PdfContents> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| Error::Document(format!("Error analyzing PDF: {}", e)))?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(Error::Document("PDF is empty".into()));
    }

    let mut page_texts = match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(texts) => texts,
        Err(e) => {
            tracing::warn!("pdf-extract failed ({}), falling back to basic text extraction", e);
            pages
                .keys()
                .map(|n| doc.extract_text(&[*n]).unwrap_or_default())
                .collect()
        }
    };
    // Keep exactly one entry per page even if the extractor disagrees on the count.
    page_texts.resize(pages.len(), String::new());

    Ok(PdfContents {
        page_texts,
        title: info_title(&doc),
    })
}

/// `/Title` from the trailer's Info dictionary, if present and non-blank.
fn info_title(doc: &lopdf::Document) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let dict = match info.as_reference() {
        Ok(id) => doc.get_dictionary(id).ok()?,
        Err(_) => info.as_dict().ok()?,
    };
    let raw = dict.get(b"Title").ok()?.as_str().ok()?;
    let title = decode_pdf_string(raw);
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// PDF text strings are either UTF-16BE with a BOM or single-byte.
fn decode_pdf_string(raw: &[u8]) -> String {
    if let Some(body) = raw.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        raw.iter().map(|&b| b as char).collect()
    }
}

/// The analysis prompt built from extracted contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfPrompt {
    pub text: String,
    /// Whether the extracted text was cut at the character ceiling.
    pub truncated: bool,
    pub total_chars: usize,
}

/// Build the analysis prompt, embedding at most `limit` characters of the
/// labeled text.
pub fn build_prompt(contents: &PdfContents, limit: usize) -> PdfPrompt {
    let full = contents.labeled_text();
    let total_chars = full.chars().count();
    let (excerpt, truncated) = match full.char_indices().nth(limit) {
        Some((cut, _)) => (&full[..cut], true),
        None => (full.as_str(), false),
    };
    let pages = contents.page_count();
    let title = contents.title.as_deref().unwrap_or("N/A");
    let note = if truncated {
        format!(
            "\n[Extracted text truncated: showing the first {} of {} characters.]\n",
            limit, total_chars
        )
    } else {
        String::new()
    };

    let text = format!(
        "Analyze this PDF document to create a comprehensive website design specification.

PDF METADATA:
- Total Pages: {pages}
- Title: {title}

COMPLETE EXTRACTED TEXT (All {pages} pages):
{excerpt}{note}
VISUAL ANALYSIS (First page image attached):
Based on the image and text, provide a detailed description that includes:

1. **Content Structure**: Identify all sections, headings, and key information from the PDF
2. **Visual Design**: Describe colors, fonts, layout patterns, and styling from the first page
3. **Content Categories**: List all distinct content types (e.g., contact info, services, features, pricing, testimonials, etc.)
4. **Key Information**: Extract specific details like:
   - Company/Product name
   - Contact information (phone, email, address)
   - Services or features offered
   - Pricing or packages
   - Any calls-to-action
   - Social media or website links

5. **Website Type**: Determine what type of website this should be (landing page, portfolio, business site, etc.)

IMPORTANT: Your description will be used to generate a complete, content-rich website. Include ALL important text content, data, and information from the PDF so it can be incorporated into the final website code.
"
    );

    PdfPrompt {
        text,
        truncated,
        total_chars,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("PDF renderer unavailable: {0}")]
    Unavailable(String),
    #[error("failed to render first page: {0}")]
    Render(String),
}

/// Renders the first page of a PDF to pixels. Blocking.
pub trait PageRasterizer: Send + Sync {
    fn render_first_page(&self, pdf: &[u8]) -> std::result::Result<RgbaImage, RasterError>;
}

/// Rasterizer backed by the pdfium shared library, bound on first use.
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
    pdfium: OnceLock<std::result::Result<Pdfium, String>>,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self {
            library_dir,
            pdfium: OnceLock::new(),
        }
    }

    fn pdfium(&self) -> std::result::Result<&Pdfium, RasterError> {
        let bound = self.pdfium.get_or_init(|| {
            let bindings = match &self.library_dir {
                Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
                None => Pdfium::bind_to_system_library(),
            };
            bindings.map(Pdfium::new).map_err(|e| e.to_string())
        });
        bound
            .as_ref()
            .map_err(|e| RasterError::Unavailable(e.clone()))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render_first_page(&self, pdf: &[u8]) -> std::result::Result<RgbaImage, RasterError> {
        let render_err = |e: pdfium_render::prelude::PdfiumError| RasterError::Render(e.to_string());

        let pdfium = self.pdfium()?;
        let document = pdfium.load_pdf_from_byte_slice(pdf, None).map_err(render_err)?;
        let page = document.pages().get(0).map_err(render_err)?;
        let bitmap = page
            .render_with_config(&PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE))
            .map_err(render_err)?;

        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
            .ok_or_else(|| RasterError::Render(format!("bitmap size mismatch for {}x{}", width, height)))
    }
}
