//! Google Gemini provider
//!
//! Replies are requested from `streamGenerateContent` with `alt=sse`. The
//! response body is a server-sent event stream; each `data:` payload is a
//! JSON chunk whose candidate parts carry the next piece of reply text.

use crate::config::GeminiConfig;
use crate::error::{MenteSaError, Result};
use crate::providers::{Message, ModelClient, TextStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffered chunks between the SSE reader task and the consumer
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Gemini `streamGenerateContent` client
///
/// # Examples
///
/// ```
/// use mentesa::config::GeminiConfig;
/// use mentesa::providers::{GeminiProvider, ModelClient};
///
/// let config = GeminiConfig {
///     api_key: Some("test-key".to_string()),
///     ..Default::default()
/// };
/// let provider = GeminiProvider::new(config).unwrap();
/// assert_eq!(provider.model_name(), "gemini-1.5-flash");
/// ```
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: Some(text.to_string()),
        }],
    }
}

fn format_gemini_api_error(status: reqwest::StatusCode, body: &str) -> MenteSaError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        MenteSaError::MissingCredentials(format!(
            "Gemini rejected the API key ({}): {}",
            status, body
        ))
    } else {
        MenteSaError::Provider(format!("Gemini returned error {}: {}", status, body))
    }
}

/// Extracts the reply text carried by one SSE `data:` payload
///
/// Returns `Ok(None)` for chunks without text (e.g. the final chunk that only
/// carries a finish reason).
pub(crate) fn extract_chunk_text(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| MenteSaError::Provider(format!("Malformed Gemini chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(MenteSaError::Provider(format!(
            "Gemini stream error {}: {}",
            error.code.unwrap_or_default(),
            error.message
        ))
        .into());
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(None);
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason == "SAFETY" {
            tracing::warn!("Gemini stopped the reply for safety reasons");
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(if text.is_empty() { None } else { Some(text) })
}

/// Removes every complete SSE event from `buffer` and returns their data values
///
/// Events are separated by a blank line. Multi-line data values are joined
/// with `\n`; comment lines and other fields are ignored. Only complete
/// events are decoded, so a code point split across network chunks stays
/// in the buffer until its remaining bytes arrive.
pub(crate) fn drain_sse_events(buffer: &mut Vec<u8>) -> Vec<String> {
    buffer.retain(|b| *b != b'\r');

    let mut events = Vec::new();
    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let block: Vec<u8> = buffer.drain(..pos + 2).collect();
        if let Some(data) = sse_event_data(&String::from_utf8_lossy(&block)) {
            events.push(data);
        }
    }
    events
}

fn sse_event_data(block: &str) -> Option<String> {
    let data_lines: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    let data = data_lines.join("\n");
    if data.is_empty() || data == "[DONE]" {
        None
    } else {
        Some(data)
    }
}

/// Reads the SSE body and forwards reply text chunks to `tx`
///
/// Stops at the first error, or as soon as the receiving side is dropped.
async fn forward_sse_text(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    tx: mpsc::Sender<Result<String>>,
) {
    let mut buffer: Vec<u8> = Vec::new();
    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(Err(MenteSaError::Provider(format!(
                        "Gemini stream interrupted: {}",
                        e
                    ))
                    .into()))
                    .await;
                return;
            }
        };

        buffer.extend_from_slice(&chunk);

        for data in drain_sse_events(&mut buffer) {
            match extract_chunk_text(&data) {
                Ok(Some(text)) => {
                    if tx.send(Ok(text)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }

    // A final event may arrive without the trailing blank line.
    buffer.retain(|b| *b != b'\r');
    if let Some(data) = sse_event_data(&String::from_utf8_lossy(&buffer)) {
        match extract_chunk_text(&data) {
            Ok(Some(text)) => {
                let _ = tx.send(Ok(text)).await;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    }
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured or the HTTP client cannot
    /// be built
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MenteSaError::MissingCredentials("gemini".to_string()))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("mentesa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MenteSaError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized Gemini provider: model={}", config.model);

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_request(&self, system_prompt: &str, history: &[Message], prompt: &str) -> GenerateRequest {
        let mut contents: Vec<GeminiContent> = history
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| text_content(Some(&m.role), &m.content))
            .collect();
        contents.push(text_content(Some(crate::providers::base::ROLE_USER), prompt));

        GenerateRequest {
            system_instruction: text_content(None, system_prompt),
            contents,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        }
    }
}

#[async_trait]
impl ModelClient for GeminiProvider {
    async fn stream_reply(
        &self,
        system_prompt: &str,
        history: &[Message],
        prompt: &str,
    ) -> Result<TextStream> {
        let request = self.build_request(system_prompt, history, prompt);
        tracing::debug!(
            "Sending Gemini request: model={}, history={} messages",
            self.config.model,
            history.len()
        );

        let response = self
            .client
            .post(self.endpoint_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MenteSaError::Provider(format!("Failed to reach Gemini: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini request failed with status {}", status);
            return Err(format_gemini_api_error(status, &body).into());
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::spawn(forward_sse_text(response.bytes_stream(), tx));

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
