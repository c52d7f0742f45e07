// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Language assistant: summaries and translations of recognized text.
//
// The assistant is optional and called once per request. A rate-limit or
// outage is reported to the caller as-is; nothing here retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use scanwerk_core::config::AssistantConfig;
use scanwerk_core::error::AssistantError;

/// Prefix the summary request starts with.
pub const SUMMARY_PROMPT: &str = "Summarize the main points of the following text: ";

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, AssistantError>;

    /// Translate `text` into `target_language` (a language name or code),
    /// keeping its layout.
    async fn translate(&self, text: &str, target_language: &str)
    -> Result<String, AssistantError>;
}

// ---------------------------------------------------------------------------
// Chat-completions client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// `Assistant` over an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiAssistant {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiAssistant {
    /// Build a client from settings, reading the API key from the
    /// environment variable named in `config.api_key_env`.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AssistantError::Unavailable(format!(
                    "no API key in environment variable {}",
                    config.api_key_env
                ))
            })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &AssistantConfig, api_key: impl Into<String>) -> Result<Self, AssistantError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AssistantError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String, AssistantError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.7,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AssistantError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "assistant request failed");
            return Err(status_error(status, retry_after, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::Unavailable(e.to_string()))?;
        let content = parse_completion(&body)?;
        debug!(reply_len = content.len(), "assistant replied");
        Ok(content)
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn summarize(&self, text: &str) -> Result<String, AssistantError> {
        let text = non_empty(text)?;
        let summary = self
            .complete(None, &format!("{SUMMARY_PROMPT}{text}"))
            .await?;
        info!(summary_len = summary.len(), "summary received");
        Ok(summary)
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, AssistantError> {
        let text = non_empty(text)?;
        let system = translation_instruction(target_language);
        self.complete(Some(&system), text).await
    }
}

fn non_empty(text: &str) -> Result<&str, AssistantError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AssistantError::EmptyInput);
    }
    Ok(text)
}

fn translation_instruction(target_language: &str) -> String {
    format!(
        "You are a helpful assistant that translates text to {target_language}. \
         Maintain the same format and structure of the input text."
    )
}

/// Map an unsuccessful HTTP status to an assistant error.
fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> AssistantError {
    let detail = body.chars().take(200).collect::<String>();
    match status {
        StatusCode::TOO_MANY_REQUESTS => AssistantError::RateLimited {
            retry_after_secs: retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AssistantError::Unavailable(format!("credentials rejected ({status})"))
        }
        s if s.is_server_error() => AssistantError::Unavailable(format!("{status}: {detail}")),
        _ => AssistantError::InvalidResponse(format!("{status}: {detail}")),
    }
}

/// First choice's message content from a chat-completions response body.
fn parse_completion(body: &str) -> Result<String, AssistantError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| AssistantError::InvalidResponse(format!("malformed JSON: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_owned())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| AssistantError::InvalidResponse("no message content".into()))
}

// ---------------------------------------------------------------------------
// Canned assistant
// ---------------------------------------------------------------------------

/// Answers every request with a fixed reply, or a fixed error.
#[derive(Debug, Clone)]
pub struct CannedAssistant {
    reply: Result<String, AssistantError>,
}

impl CannedAssistant {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
        }
    }

    pub fn failing(error: AssistantError) -> Self {
        Self { reply: Err(error) }
    }
}

#[async_trait]
impl Assistant for CannedAssistant {
    async fn summarize(&self, text: &str) -> Result<String, AssistantError> {
        non_empty(text)?;
        self.reply.clone()
    }

    async fn translate(&self, text: &str, _target: &str) -> Result<String, AssistantError> {
        non_empty(text)?;
        self.reply.clone()
    }
}
