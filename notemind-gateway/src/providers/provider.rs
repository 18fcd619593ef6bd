//! Provider trait for abstracting different LLM providers.

use std::sync::Arc;

use notemind_core::{LlmProvider, MessageRole};
use serde::{Deserialize, Serialize};

/// One message of the conversation sent upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }
}

/// Unified usage information across providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Unified response type across providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub model: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ProviderUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("No content in response")]
    NoContent,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
}

/// Provider trait for different LLM backends
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Current model
    fn model(&self) -> &str;

    /// Send a single user message with no history.
    async fn send_message(
        &self,
        system: Option<&str>,
        content: &str,
        max_tokens: u32,
    ) -> Result<ProviderResponse, ProviderError> {
        self.send_conversation(system, &[ChatTurn::user(content)], max_tokens)
            .await
    }

    /// Send a conversation and get the reply
    async fn send_conversation(
        &self,
        system: Option<&str>,
        turns: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Builds a client for a user's key on demand.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, provider: LlmProvider, model: &str, api_key: &str) -> Arc<dyn Provider>;
}

/// Shorten an upstream body for error messages.
pub(crate) fn body_preview(body: &str) -> &str {
    const MAX: usize = 500;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Fold system turns into the system prompt; providers other than OpenAI
/// only accept it out of band.
pub(crate) fn split_system(system: Option<&str>, turns: &[ChatTurn]) -> (Option<String>, Vec<ChatTurn>) {
    let mut prompt: Vec<&str> = system.into_iter().collect();
    let mut rest = Vec::with_capacity(turns.len());
    for turn in turns {
        if turn.role == MessageRole::System {
            prompt.push(&turn.content);
        } else {
            rest.push(turn.clone());
        }
    }
    let prompt = if prompt.is_empty() {
        None
    } else {
        Some(prompt.join("\n\n"))
    };
    (prompt, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_preview_respects_char_boundaries() {
        let body = "é".repeat(600);
        let preview = body_preview(&body);
        assert_eq!(preview.chars().count(), 500);
        assert_eq!(body_preview("short"), "short");
    }

    #[test]
    fn test_split_system_merges_prompts() {
        let turns = vec![
            ChatTurn::new(MessageRole::System, "Be terse."),
            ChatTurn::user("hi"),
            ChatTurn::new(MessageRole::Assistant, "hello"),
        ];
        let (system, rest) = split_system(Some("Base prompt."), &turns);
        assert_eq!(system.as_deref(), Some("Base prompt.\n\nBe terse."));
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].role, MessageRole::User);

        let (system, rest) = split_system(None, &[ChatTurn::user("x")]);
        assert!(system.is_none());
        assert_eq!(rest.len(), 1);
    }
}
