// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! OpenAI-compatible streaming chat completion client.
//!
//! Implements [`LlmService`] against any `/chat/completions` endpoint that
//! speaks the OpenAI SSE protocol (OpenAI itself, Ollama, llama.cpp,
//! vLLM, ...). Conversation turns are mapped 1:1 onto chat messages and
//! response deltas are surfaced as a fragment stream.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::context::{ConversationTurn, Role};
use crate::error::ParleyError;
use crate::services::shared::sse::{SseEvent, SseParser};
use crate::services::{LlmService, TextStream};

/// Chat message in the OpenAI wire format.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

/// OpenAI-compatible chat completion backend.
pub struct OpenAiChatService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
}

impl OpenAiChatService {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(90))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Builder: point at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builder: set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Builder: cap the response length.
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn wire_role(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Pull the text delta out of one streamed completion chunk.
///
/// Returns `None` for chunks without content (role announcements, finish
/// markers); malformed JSON is treated the same way rather than aborting
/// the whole response.
fn extract_delta(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    let content = value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

#[async_trait]
impl LlmService for OpenAiChatService {
    async fn complete(&self, turns: &[ConversationTurn]) -> Result<TextStream, ParleyError> {
        let messages: Vec<ChatMessage<'_>> = turns
            .iter()
            .map(|t| ChatMessage {
                role: Self::wire_role(t.role),
                content: &t.content,
            })
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, turns = turns.len(), "starting streaming chat completion");

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.json(&body).send().await?;
        let response = response
            .error_for_status()
            .map_err(|e| ParleyError::Generation(format!("chat completion failed: {e}")))?;

        let mut parser = SseParser::new();
        let mut done = false;
        let fragments = response.bytes_stream().flat_map(move |chunk| {
            let items: Vec<Result<String, ParleyError>> = match chunk {
                Ok(bytes) if !done => {
                    let text = String::from_utf8_lossy(&bytes);
                    parser
                        .feed(&text)
                        .into_iter()
                        .filter_map(|event| match event {
                            SseEvent::Data(data) => extract_delta(&data).map(Ok),
                            SseEvent::Done => {
                                done = true;
                                None
                            }
                        })
                        .collect()
                }
                Ok(_) => Vec::new(),
                Err(e) => vec![Err(ParleyError::Generation(format!(
                    "response stream failed: {e}"
                )))],
            };
            futures_util::stream::iter(items)
        });

        Ok(Box::pin(fragments))
    }
}
