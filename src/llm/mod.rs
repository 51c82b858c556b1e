//! LLM boundary
//!
//! Everything the agents ask a model goes through [`LlmClient`]. Replies that
//! should be JSON are parsed with [`parse_json_reply`]; shape errors surface as
//! `MalformedLlmResponse` so callers can re-prompt once.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::BiError;
use crate::Result;

pub mod openai;
pub mod prompts;

pub use openai::OpenAiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    pub format: ReplyFormat,
}

impl ChatPrompt {
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ReplyFormat::Json,
        }
    }

    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ReplyFormat::Text,
        }
    }

    /// Same prompt with the previous failure appended to the user turn.
    pub fn with_failure(&self, failure: &str) -> Self {
        Self {
            system: self.system.clone(),
            user: format!(
                "{}\n\nYour previous answer was rejected: {}\nReturn a corrected answer in the required format.",
                self.user, failure
            ),
            format: self.format,
        }
    }
}

/// Chat-completion backend
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String>;
}

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").unwrap();
}

/// Parse a JSON object out of a model reply. Accepts bare JSON, fenced
/// blocks, or an object embedded in prose.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let trimmed = reply.trim();

    let candidate = if let Some(caps) = FENCED_BLOCK.captures(trimmed) {
        caps.get(1).map_or(trimmed, |m| m.as_str())
    } else if trimmed.starts_with('{') {
        trimmed
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => {
                return Err(BiError::MalformedLlmResponse(format!(
                    "expected a JSON object, got: {}",
                    truncate(trimmed, 200)
                )))
            }
        }
    };

    serde_json::from_str(candidate).map_err(|e| {
        BiError::MalformedLlmResponse(format!("{} | raw={}", e, truncate(trimmed, 200)))
    })
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
