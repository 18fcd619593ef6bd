//! Google Gemini API client.

use notemind_core::MessageRole;
use serde::{Deserialize, Serialize};

use crate::providers::provider::{
    ChatTurn, Provider, ProviderError, ProviderResponse, ProviderUsage, body_preview,
    split_system,
};
use crate::providers::query_dump::QueryDump;

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dump_queries: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: Some(text.to_string()),
        }],
    }
}

impl GeminiClient {
    pub fn new(
        http_client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
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

    fn build_request(
        &self,
        system: Option<&str>,
        turns: &[ChatTurn],
        max_tokens: u32,
    ) -> GenerateContentRequest {
        let (system, turns) = split_system(system, turns);
        let contents = turns
            .iter()
            .map(|turn| {
                // Gemini calls the assistant "model".
                let role = match turn.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                text_content(Some(role), &turn.content)
            })
            .collect();

        GenerateContentRequest {
            contents,
            system_instruction: system.map(|text| text_content(None, &text)),
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
            },
        }
    }

    /// Text of the first candidate
    pub fn extract_text(response: &GenerateContentResponse) -> String {
        response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Provider for GeminiClient {
    fn name(&self) -> &str {
        "google"
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
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request_body = self.build_request(system, turns, max_tokens);

        let dump = if self.dump_queries
            && let Ok(val) = serde_json::to_value(&request_body)
        {
            QueryDump::request("google", &self.model, &val).await
        } else {
            None
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let body: GenerateContentResponse = response.json().await?;

        if let Some(dump) = dump
            && let Ok(val) = serde_json::to_value(&body)
        {
            dump.response(&val).await;
        }

        if body.candidates.is_empty() {
            return Err(ProviderError::NoContent);
        }
        let text = Self::extract_text(&body);
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidFormat(
                "candidate has no text parts".to_string(),
            ));
        }

        Ok(ProviderResponse {
            model: body.model_version.unwrap_or_else(|| self.model.clone()),
            text,
            usage: body.usage_metadata.map(|u| ProviderUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            }),
            stop_reason: body.candidates.first().and_then(|c| c.finish_reason.clone()),
        })
    }
}
