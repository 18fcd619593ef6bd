//! Shared harness: the real router over an in-memory database and a
//! scripted provider factory.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use notemind_core::LlmProvider;
use notemind_core::config::{ChatSettings, CorsSettings};
use notemind_db::test_helpers::create_test_pool;
use notemind_gateway::auth::AuthKeys;
use notemind_gateway::providers::{
    ChatTurn, Provider, ProviderError, ProviderFactory, ProviderResponse, ProviderUsage,
};
use notemind_gateway::server::create_router;
use notemind_gateway::state::AppState;
use notemind_gateway::vault::KeyVault;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const SCRIPTED_TITLE: &str = "Scripted Title";

/// One upstream call as the provider saw it
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key: String,
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
}

#[derive(Default)]
pub struct ScriptedFactory {
    failing: AtomicBool,
    replies: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedFactory {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> RecordedCall {
        self.calls().pop().expect("no provider call recorded")
    }
}

struct ScriptedProvider {
    factory: Arc<ScriptedFactory>,
    provider: LlmProvider,
    model: String,
    api_key: String,
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        self.provider.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_conversation(
        &self,
        system: Option<&str>,
        turns: &[ChatTurn],
        _max_tokens: u32,
    ) -> Result<ProviderResponse, ProviderError> {
        self.factory.calls.lock().unwrap().push(RecordedCall {
            provider: self.provider,
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            system: system.map(str::to_string),
            turns: turns.to_vec(),
        });

        if self.factory.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiError {
                status: 503,
                message: "scripted outage".to_string(),
            });
        }

        // Title requests carry no system prompt.
        let text = if system.is_none() {
            format!("\"{SCRIPTED_TITLE}\"")
        } else {
            let n = self.factory.replies.fetch_add(1, Ordering::SeqCst) + 1;
            let last = turns.last().map(|t| t.content.as_str()).unwrap_or_default();
            format!("Reply {n} to: {last}")
        };
        Ok(ProviderResponse {
            model: self.model.clone(),
            text,
            usage: Some(ProviderUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
            stop_reason: Some("stop".to_string()),
        })
    }
}

/// Factory handle shared with the router
pub struct SharedFactory(pub Arc<ScriptedFactory>);

impl ProviderFactory for SharedFactory {
    fn build(&self, provider: LlmProvider, model: &str, api_key: &str) -> Arc<dyn Provider> {
        Arc::new(ScriptedProvider {
            factory: Arc::clone(&self.0),
            provider,
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub factory: Arc<ScriptedFactory>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = create_test_pool().await.expect("in-memory database");
        let factory = Arc::new(ScriptedFactory::default());
        let vault = KeyVault::from_base64(&BASE64.encode([42u8; 32])).expect("vault key");
        let state = Arc::new(AppState::new(
            db,
            ChatSettings::default(),
            CorsSettings::default(),
            AuthKeys::new("test-jwt-secret", 24),
            vault,
            Arc::new(SharedFactory(Arc::clone(&factory))),
        ));
        Self {
            router: create_router(Arc::clone(&state)),
            state,
            factory,
        }
    }

    /// Send a request and decode the JSON body (`Value::Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, body) = self.request_full(method, uri, token, body).await;
        (status, body)
    }

    pub async fn request_full(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, value)
    }

    /// Register a user and return their bearer token.
    pub async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/users/",
                None,
                Some(json!({
                    "email": email,
                    "password": "correct-horse",
                    "first_name": "Ada",
                    "last_name": "Lovelace"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Register a user who has an OpenAI and an Anthropic key.
    pub async fn register_with_keys(&self, email: &str) -> String {
        let token = self.register(email).await;
        let (status, _) = self
            .request(
                Method::PUT,
                "/users/api-keys",
                Some(&token),
                Some(json!({
                    "openai_api_key": "sk-openai-test-1234",
                    "anthropic_api_key": "sk-ant-test-5678"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        token
    }

    pub async fn create_conversation(&self, token: &str, first_message: &str) -> Value {
        let (status, body) = self
            .request(
                Method::POST,
                "/conversations",
                Some(token),
                Some(json!({
                    "provider": "openai",
                    "model_name": "gpt-4o",
                    "first_message": first_message
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body
    }
}

pub fn assert_percentages_sum(conversation: &Value) {
    let used = conversation["total_used_percentage"].as_f64().unwrap();
    let remaining = conversation["remaining_percentage"].as_f64().unwrap();
    assert!((used + remaining - 100.0).abs() < 1e-6, "{used} + {remaining}");
}
