//! OpenAI Chat Completions client.

use serde::{Deserialize, Serialize};

use crate::providers::provider::{
    ChatTurn, Provider, ProviderError, ProviderResponse, ProviderUsage, body_preview,
};
use crate::providers::query_dump::QueryDump;

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dump_queries: bool,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionsResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Choice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAiClient {
    pub fn new(
        http_client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
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
        turns: &[ChatTurn],
        max_tokens: u32,
    ) -> ChatCompletionsRequest<'a> {
        let messages = system
            .map(|s| OpenAiMessage {
                role: "system".to_string(),
                content: Some(s.to_string()),
            })
            .into_iter()
            .chain(turns.iter().map(|turn| OpenAiMessage {
                role: turn.role.as_str().to_string(),
                content: Some(turn.content.clone()),
            }))
            .collect();

        ChatCompletionsRequest {
            model: &self.model,
            messages,
            max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
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
        let url = format!("{}/chat/completions", self.base_url);
        let request_body = self.build_request(system, turns, max_tokens);

        let dump = if self.dump_queries
            && let Ok(val) = serde_json::to_value(&request_body)
        {
            QueryDump::request("openai", &self.model, &val).await
        } else {
            None
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
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

        let body: ChatCompletionsResponse = response.json().await?;

        if let Some(dump) = dump
            && let Ok(val) = serde_json::to_value(&body)
        {
            dump.response(&val).await;
        }

        let choice = body.choices.into_iter().next().ok_or(ProviderError::NoContent)?;
        let text = choice
            .message
            .content
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProviderError::NoContent)?;

        Ok(ProviderResponse {
            model: body.model,
            text,
            usage: body.usage.map(|u| ProviderUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            stop_reason: choice.finish_reason,
        })
    }
}
