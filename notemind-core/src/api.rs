//! JSON bodies shared by the gateway and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounting::ContextUsage;
use crate::provider::{LlmProvider, MessageRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tokens_used: u32,
    pub sequence_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub provider: LlmProvider,
    pub model_name: String,
    pub folder_id: Option<String>,
    pub message_count: u32,
    #[serde(flatten)]
    pub usage: ContextUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Present on single-conversation reads and on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageResponse>>,
}

/// Fields a client merges into its cached copy after a send
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub provider: Option<LlmProvider>,
    pub model_name: Option<String>,
    pub message_count: Option<u32>,
    pub usage: Option<ContextUsage>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationPatch {
    /// Patch carrying every metadata field of `conversation`.
    pub fn from_conversation(conversation: &ConversationResponse) -> Self {
        Self {
            title: Some(conversation.title.clone()),
            provider: Some(conversation.provider),
            model_name: Some(conversation.model_name.clone()),
            message_count: Some(conversation.message_count),
            usage: Some(conversation.usage),
            updated_at: Some(conversation.updated_at),
        }
    }

    pub fn apply(&self, conversation: &mut ConversationResponse) {
        if let Some(title) = &self.title {
            conversation.title = title.clone();
        }
        if let Some(provider) = self.provider {
            conversation.provider = provider;
        }
        if let Some(model_name) = &self.model_name {
            conversation.model_name = model_name.clone();
        }
        if let Some(count) = self.message_count {
            conversation.message_count = count;
        }
        if let Some(usage) = self.usage {
            conversation.usage = usage;
        }
        if let Some(updated_at) = self.updated_at {
            conversation.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesPage {
    pub total: u64,
    pub skip: u32,
    pub limit: u32,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub provider: LlmProvider,
    pub model_name: String,
    pub first_message: String,
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// The assistant reply
    pub message: MessageResponse,
    /// The stored user message, so clients can confirm optimistic copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<MessageResponse>,
    pub conversation: ConversationResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchModelRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<LlmProvider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

/// Key update; an empty string clears, an absent field is left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskedApiKeys {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderResponse {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub provider: LlmProvider,
    pub context_window: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> ConversationResponse {
        ConversationResponse {
            id: "conv_1".to_string(),
            user_id: "user_1".to_string(),
            title: "Old".to_string(),
            provider: LlmProvider::OpenAi,
            model_name: "gpt-4o".to_string(),
            folder_id: None,
            message_count: 2,
            usage: ContextUsage::compute(1280, 128_000),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            updated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            messages: None,
        }
    }

    #[test]
    fn test_usage_fields_are_flattened() {
        let value = serde_json::to_value(conversation()).unwrap();
        assert_eq!(value["total_tokens_used"], 1280);
        assert_eq!(value["total_context_size"], 128_000);
        assert_eq!(value["remaining_context_size"], 126_720);
        assert_eq!(value["total_used_percentage"], 1.0);
        assert_eq!(value["remaining_percentage"], 99.0);
        assert!(value.get("messages").is_none());
        assert!(value.get("usage").is_none());

        let back: ConversationResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, conversation());
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut conv = conversation();
        let patch = ConversationPatch {
            title: Some("New".to_string()),
            message_count: Some(4),
            ..Default::default()
        };
        patch.apply(&mut conv);
        assert_eq!(conv.title, "New");
        assert_eq!(conv.message_count, 4);
        assert_eq!(conv.model_name, "gpt-4o");
        assert_eq!(conv.usage.total_tokens_used, 1280);
    }

    #[test]
    fn test_send_request_omits_default_limit() {
        let body = SendMessageRequest {
            content: "hi".to_string(),
            context_limit_tokens: None,
        };
        let value = serde_json::to_value(body).unwrap();
        assert!(value.get("context_limit_tokens").is_none());
    }
}
