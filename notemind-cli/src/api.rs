use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use notemind_core::api::{
    ApiKeysUpdate, ConversationResponse, CreateConversationRequest, EditMessageRequest,
    ErrorResponse, FolderRequest, FolderResponse, LoginRequest, MaskedApiKeys, MessageResponse,
    MessagesPage, ModelsResponse, RegisterRequest, SendMessageRequest, SendMessageResponse,
    SwitchModelRequest, TokenResponse, UserResponse,
};
use notemind_core::LlmProvider;

use crate::tabs::ConversationSource;

/// Largest page the gateway hands out
const PAGE_LIMIT: u32 = 100;

/// HTTP client errors
#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },
    #[error("Not logged in")]
    NotAuthenticated,
}

impl ApiClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Typed client for the gateway's JSON API
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiClientError> {
        let mut base_url = Url::parse(base_url)?;
        // Url::join drops the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> Result<Url, ApiClientError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        authenticated: bool,
    ) -> Result<reqwest::Response, ApiClientError> {
        let url = self.url(path)?;
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if authenticated {
            let token = self.token.as_ref().ok_or(ApiClientError::NotAuthenticated)?;
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(ErrorResponse {
                error,
                field: Some(field),
            }) => format!("{}: {}", field, error),
            Ok(ErrorResponse { error, field: None }) => error,
            Err(_) if text.is_empty() => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
            Err(_) => text,
        };
        Err(ApiClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiClientError> {
        let response = self
            .send::<()>(Method::GET, path, query, None, true)
            .await?;
        Ok(response.json().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiClientError> {
        let response = self.send(method, path, &[], Some(body), true).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), ApiClientError> {
        self.send::<()>(Method::DELETE, path, &[], None, true)
            .await?;
        Ok(())
    }

    // Accounts

    pub async fn register(
        &mut self,
        request: &RegisterRequest,
    ) -> Result<UserResponse, ApiClientError> {
        let response = self
            .send(Method::POST, "users/", &[], Some(request), false)
            .await?;
        let token: TokenResponse = response.json().await?;
        self.token = Some(token.access_token);
        Ok(token.user)
    }

    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<UserResponse, ApiClientError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .send(Method::POST, "users/login", &[], Some(&request), false)
            .await?;
        let token: TokenResponse = response.json().await?;
        self.token = Some(token.access_token);
        Ok(token.user)
    }

    pub async fn me(&self) -> Result<UserResponse, ApiClientError> {
        self.get_json("users/me", &[]).await
    }

    pub async fn api_keys(&self) -> Result<MaskedApiKeys, ApiClientError> {
        self.get_json("users/api-keys", &[]).await
    }

    pub async fn update_api_keys(
        &self,
        update: &ApiKeysUpdate,
    ) -> Result<MaskedApiKeys, ApiClientError> {
        self.send_json(Method::PUT, "users/api-keys", update).await
    }

    // Catalogue

    pub async fn models(&self) -> Result<ModelsResponse, ApiClientError> {
        let response = self
            .send::<()>(Method::GET, "models", &[], None, false)
            .await?;
        Ok(response.json().await?)
    }

    // Folders

    pub async fn folders(&self) -> Result<Vec<FolderResponse>, ApiClientError> {
        self.get_json("folders", &[("limit", PAGE_LIMIT.to_string())])
            .await
    }

    pub async fn create_folder(&self, name: &str) -> Result<FolderResponse, ApiClientError> {
        let request = FolderRequest {
            name: name.to_string(),
        };
        self.send_json(Method::POST, "folders", &request).await
    }

    // Conversations

    pub async fn conversations(
        &self,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<ConversationResponse>, ApiClientError> {
        self.get_json(
            "conversations",
            &[("skip", skip.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    pub async fn conversation(&self, id: &str) -> Result<ConversationResponse, ApiClientError> {
        self.get_json(&format!("conversations/{}", id), &[]).await
    }

    /// Every message of a conversation, walking the pages in sequence order.
    pub async fn all_messages(&self, id: &str) -> Result<Vec<MessageResponse>, ApiClientError> {
        let path = format!("conversations/{}/messages", id);
        let mut messages = Vec::new();
        loop {
            let page: MessagesPage = self
                .get_json(
                    &path,
                    &[
                        ("skip", messages.len().to_string()),
                        ("limit", PAGE_LIMIT.to_string()),
                        ("order", "asc".to_string()),
                    ],
                )
                .await?;
            let fetched = page.messages.len();
            messages.extend(page.messages);
            if fetched == 0 || messages.len() as u64 >= page.total {
                return Ok(messages);
            }
        }
    }

    pub async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<ConversationResponse, ApiClientError> {
        self.send_json(Method::POST, "conversations", request).await
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiClientError> {
        self.send_json(
            Method::POST,
            &format!("conversations/{}/messages", conversation_id),
            request,
        )
        .await
    }

    pub async fn switch_model(
        &self,
        conversation_id: &str,
        model: &str,
        provider: Option<LlmProvider>,
    ) -> Result<ConversationResponse, ApiClientError> {
        let request = SwitchModelRequest {
            model: model.to_string(),
            provider,
        };
        self.send_json(
            Method::PATCH,
            &format!("conversations/{}/model", conversation_id),
            &request,
        )
        .await
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), ApiClientError> {
        self.delete(&format!("conversations/{}", id)).await
    }

    // Messages

    pub async fn edit_message(
        &self,
        id: &str,
        content: &str,
    ) -> Result<MessageResponse, ApiClientError> {
        let request = EditMessageRequest {
            content: content.to_string(),
        };
        self.send_json(Method::PATCH, &format!("messages/{}", id), &request)
            .await
    }

    pub async fn delete_message(&self, id: &str) -> Result<(), ApiClientError> {
        self.delete(&format!("messages/{}", id)).await
    }
}

#[async_trait]
impl ConversationSource for ApiClient {
    async fn fetch_conversation(&self, id: &str) -> Result<ConversationResponse, ApiClientError> {
        let mut conversation = self.conversation(id).await?;
        // Messages are cached separately
        conversation.messages = None;
        Ok(conversation)
    }

    async fn fetch_messages(&self, id: &str) -> Result<Vec<MessageResponse>, ApiClientError> {
        self.all_messages(id).await
    }
}
