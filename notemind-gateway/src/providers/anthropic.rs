//! Anthropic Messages API client.

use notemind_core::MessageRole;
use serde::{Deserialize, Serialize};

use crate::providers::provider::{
    ChatTurn, Provider, ProviderError, ProviderResponse, ProviderUsage, body_preview,
    split_system,
};
use crate::providers::query_dump::QueryDump;

const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
#[derive(Clone)]
pub struct AnthropicClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dump_queries: bool,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AnthropicClient {
    pub fn new(
        http_client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            dump_queries: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_dump_queries(mut self, enabled: bool) -> Self {
        self.dump_queries = enabled;
        self
    }

    fn build_request<'a>(
        &'a self,
        system: Option<&str>,
        turns: &'a [ChatTurn],
        max_tokens: u32,
    ) -> MessagesRequest<'a> {
        let (system, _) = split_system(system, turns);
        let messages = turns
            .iter()
            .filter_map(|turn| match turn.role {
                MessageRole::User => Some(AnthropicMessage {
                    role: "user",
                    content: &turn.content,
                }),
                MessageRole::Assistant => Some(AnthropicMessage {
                    role: "assistant",
                    content: &turn.content,
                }),
                MessageRole::System => None,
            })
            .collect();

        MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages,
        }
    }

    /// Concatenated text blocks of a response
    pub fn extract_text(response: &MessagesResponse) -> String {
        response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_conversation(
        &self,
        system: Option<&str>,
        turns: &[ChatTurn],
        max_tokens: u32,
    ) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        let request_body = self.build_request(system, turns, max_tokens);

        let dump = if self.dump_queries
            && let Ok(val) = serde_json::to_value(&request_body)
        {
            QueryDump::request("anthropic", &self.model, &val).await
        } else {
            None
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body_preview(&error_text).to_string(),
            });
        }

        let messages_response: MessagesResponse = response.json().await?;

        if let Some(dump) = dump
            && let Ok(val) = serde_json::to_value(&messages_response)
        {
            dump.response(&val).await;
        }

        let text = Self::extract_text(&messages_response);
        if text.trim().is_empty() {
            return Err(ProviderError::NoContent);
        }

        Ok(ProviderResponse {
            model: messages_response.model,
            text,
            usage: messages_response.usage.map(|u| ProviderUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            stop_reason: messages_response.stop_reason,
        })
    }
}
