//! OpenAI-compatible chat-completion client
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! Works against any endpoint that speaks `/chat/completions`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::{ChatPrompt, LlmClient, ReplyFormat};
use crate::config::Settings;
use crate::error::BiError;
use crate::Result;

/// Reusable chat client (connection-pooled)
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.0,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.openai_api_key.clone(),
            settings.openai_base_url.clone(),
            settings.llm_model.clone(),
            settings.llm_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, prompt: &'a ChatPrompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            response_format: match prompt.format {
                ReplyFormat::Json => Some(ResponseFormat {
                    kind: "json_object",
                }),
                ReplyFormat::Text => None,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(BiError::LlmError("OPENAI_API_KEY not configured".to_string()));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(prompt);
        let started = Instant::now();

        debug!(model = %self.model, format = ?prompt.format, "Calling chat completion API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                if e.is_timeout() {
                    BiError::LlmError(format!("LLM request timed out: {}", e))
                } else {
                    BiError::LlmError(format!("LLM request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Chat completion error response: {}", error_text);
            return Err(BiError::LlmError(format!(
                "LLM API returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat completion response: {}", e);
            BiError::MalformedLlmResponse(format!("completion envelope: {}", e))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BiError::MalformedLlmResponse("no choices returned".to_string()))?;

        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| BiError::MalformedLlmResponse("empty completion".to_string()))?;

        info!(
            model = %self.model,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            prompt_tokens = completion.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens = completion.usage.as_ref().map(|u| u.completion_tokens),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat completion received"
        );

        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
