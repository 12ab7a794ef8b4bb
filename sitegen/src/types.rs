use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Base64-encoded image data.
    pub data: String,
    /// MIME type, e.g. "image/png".
    pub mime_type: String,
}

impl ImageContent {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextContent),
    Image(ImageContent),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(TextContent { text: text.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: Vec<ContentBlock>,
}

/// The conversation sent to a provider: one optional system instruction and
/// the user turns that follow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<UserMessage>,
}

impl ChatContext {
    /// Concatenated text of every user turn. Images are skipped.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                ContentBlock::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Request options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// One incoming generation request. Lives only as long as the request scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document_description: Option<String>,
}

impl GenerationRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn from_description(description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            prompt: description.clone(),
            source_document_description: Some(description),
            ..Self::default()
        }
    }

    /// The topic the prompt builder wraps: a document description when one
    /// was supplied, otherwise the raw prompt.
    pub fn topic(&self) -> &str {
        self.source_document_description
            .as_deref()
            .unwrap_or(self.prompt.as_str())
    }
}

/// Prefix of the trailing in-band fragment emitted when a stream fails after
/// content has already been delivered.
pub const INTERRUPTED_MARKER: &str = "[ERROR]: Stream interrupted - ";

/// A unit of generated output as it travels from the provider to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// Text produced by the provider, relayed verbatim.
    Text(String),
    /// Terminal in-band error. Nothing follows it.
    Interrupted(String),
}

impl StreamFragment {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFragment::Interrupted(_))
    }

    /// Wire payload for this fragment.
    pub fn into_bytes(self) -> Bytes {
        match self {
            StreamFragment::Text(text) => Bytes::from(text),
            StreamFragment::Interrupted(reason) => {
                Bytes::from(format!("\n{}{}", INTERRUPTED_MARKER, reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_prefers_document_description() {
        let req = GenerationRequest {
            prompt: "ignored".into(),
            source_document_description: Some("from the pdf".into()),
            ..Default::default()
        };
        assert_eq!(req.topic(), "from the pdf");
        assert_eq!(GenerationRequest::from_prompt("plain").topic(), "plain");
    }

    #[test]
    fn text_fragment_bytes_are_verbatim() {
        let frag = StreamFragment::Text("<h1>Caf\u{e9}</h1>".into());
        assert_eq!(&frag.into_bytes()[..], "<h1>Caf\u{e9}</h1>".as_bytes());
    }

    #[test]
    fn interrupted_fragment_renders_marker() {
        let frag = StreamFragment::Interrupted("connection reset".into());
        assert!(frag.is_terminal());
        assert_eq!(
            &frag.into_bytes()[..],
            b"\n[ERROR]: Stream interrupted - connection reset"
        );
    }

    #[test]
    fn user_text_skips_images() {
        let ctx = ChatContext {
            system_prompt: None,
            messages: vec![UserMessage {
                content: vec![
                    ContentBlock::text("describe"),
                    ContentBlock::Image(ImageContent {
                        data: "AAAA".into(),
                        mime_type: "image/png".into(),
                    }),
                ],
            }],
        };
        assert_eq!(ctx.user_text(), "describe");
    }
}
