//! Transport for OpenAI-compatible `/chat/completions` endpoints (NVIDIA NIM,
//! OpenRouter and anything else speaking the same wire format).

use super::sanitize;
use super::{Provider, ProviderConfig, ProviderError, TextStream};
use crate::config::Settings;
use crate::types::*;
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Default bound on a non-streaming completion.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(600);

/// Provider that speaks OpenAI-compatible `/chat/completions`.
///
/// Holds only a connection pool and its timeouts; endpoint, key and model
/// come from the [`ProviderConfig`] passed to each call.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    /// Bound on a streaming call until response headers arrive.
    establish_timeout: Duration,
    /// Bound on a non-streaming call, whose headers only arrive with the full reply.
    response_timeout: Duration,
}

impl OpenAiCompatibleProvider {
    pub fn new(establish_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(establish_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            establish_timeout,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Duration::from_secs(settings.connect_timeout_secs))
            .with_response_timeout(Duration::from_secs(settings.response_timeout_secs))
    }

    fn chat_completions_url(base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    /// Send the request and wait up to `wait` for a successful status line.
    async fn send(
        &self,
        target: &ProviderConfig,
        body: &ChatRequest,
        wait: Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        if target.api_key.trim().is_empty() {
            return Err(ProviderError::AuthRequired(format!(
                "API key required for {}",
                target.name
            )));
        }

        let req = self
            .client
            .post(Self::chat_completions_url(&target.base_url))
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", target.api_key))
            .json(body);

        let resp = tokio::time::timeout(wait, req.send())
            .await
            .map_err(|_| ProviderError::Timeout(wait.as_secs()))??;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(sanitize::api_error_body(status.as_u16(), &body_text));
        }
        Ok(resp)
    }
}

// ---- Request/response types (OpenAI wire format) ----
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMsg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMsg {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    error: Option<ApiErrorResp>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<DeltaContent>,
}

#[derive(Deserialize)]
struct DeltaContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResp {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

fn build_request(
    target: &ProviderConfig,
    context: &ChatContext,
    options: &RequestOptions,
    stream: bool,
) -> ChatRequest {
    ChatRequest {
        model: target.model_id.clone(),
        messages: convert_messages(context),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        stream,
    }
}

fn convert_messages(context: &ChatContext) -> Vec<ChatMsg> {
    let mut msgs = Vec::new();
    if let Some(sys) = &context.system_prompt {
        msgs.push(ChatMsg {
            role: "system",
            content: json!(sys),
        });
    }
    for msg in &context.messages {
        msgs.push(ChatMsg {
            role: "user",
            content: user_content_to_json(&msg.content),
        });
    }
    msgs
}

fn user_content_to_json(blocks: &[ContentBlock]) -> serde_json::Value {
    if let [ContentBlock::Text(t)] = blocks {
        return json!(t.text);
    }
    let parts: Vec<serde_json::Value> = blocks
        .iter()
        .map(|b| match b {
            ContentBlock::Text(t) => json!({"type": "text", "text": t.text}),
            ContentBlock::Image(img) => json!({
                "type": "image_url",
                "image_url": { "url": img.data_url() }
            }),
        })
        .collect();
    json!(parts)
}

/// Payload of an SSE `data:` line. `None` for other lines and for `[DONE]`.
fn parse_sse_line(line: &str) -> Option<&str> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data == "[DONE]" { None } else { Some(data) }
}

fn is_done_line(line: &str) -> bool {
    line.trim()
        .strip_prefix("data:")
        .is_some_and(|d| d.trim() == "[DONE]")
}

/// Decode one SSE line into the text it carries, if any.
fn decode_line(line: &str) -> Result<Option<String>, ProviderError> {
    let Some(data) = parse_sse_line(line) else {
        return Ok(None);
    };
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("skipping unparsable stream line: {}", e);
            return Ok(None);
        }
    };
    if let Some(err) = chunk.error {
        let message = err.message.unwrap_or_else(|| "provider reported an error".into());
        return Err(ProviderError::Other(sanitize::sanitize_api_error(&message)));
    }
    let text: String = chunk
        .choices
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn stream(
        &self,
        target: &ProviderConfig,
        context: &ChatContext,
        options: &RequestOptions,
    ) -> Result<TextStream, ProviderError> {
        let body = build_request(target, context, options, true);
        let resp = self.send(target, &body, self.establish_timeout).await?;
        let provider = target.name.clone();

        let s = async_stream::stream! {
            // Raw bytes are split on '\n' before decoding so a multi-byte
            // character spanning two network chunks is never mangled.
            let mut line_buf: Vec<u8> = Vec::new();
            let mut byte_stream = resp.bytes_stream();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk_bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => { yield Err(ProviderError::Network(e)); return; }
                };
                line_buf.extend_from_slice(&chunk_bytes);
                while let Some(newline_pos) = line_buf.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = line_buf.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    if is_done_line(&line) {
                        tracing::debug!(provider = %provider, "provider signalled [DONE]");
                        return;
                    }
                    match decode_line(&line) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => { yield Err(e); return; }
                    }
                }
            }

            // Trailing line without a newline terminator.
            if !line_buf.is_empty() {
                let line = String::from_utf8_lossy(&line_buf).into_owned();
                if !is_done_line(&line) {
                    match decode_line(&line) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => yield Err(e),
                    }
                }
            }
        };
        Ok(Box::pin(s))
    }

    async fn chat(
        &self,
        target: &ProviderConfig,
        context: &ChatContext,
        options: &RequestOptions,
    ) -> Result<String, ProviderError> {
        let body = build_request(target, context, options, false);
        let resp = self.send(target, &body, self.response_timeout).await?;

        let chat_resp: ChatResponse = resp.json().await?;
        chat_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Other("Empty response".into()))
    }
}
