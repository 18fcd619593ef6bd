mod common;

use axum::http::{Method, StatusCode, header};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_public_endpoints() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.request(Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "NoteMind API is running");

    let (status, body) = app.request(Method::GET, "/models", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let models = body["models"].as_array().unwrap();
    let gpt4o = models.iter().find(|m| m["id"] == "gpt-4o").unwrap();
    assert_eq!(gpt4o["provider"], "openai");
    assert_eq!(gpt4o["context_window"], 128000);
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new().await;
    let token = app.register("Ada@Example.com").await;

    let (status, me) = app.request(Method::GET, "/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@example.com");
    assert_eq!(me["first_name"], "Ada");
    assert!(me.get("password_hash").is_none());

    let (status, body) = app
        .request(
            Method::POST,
            "/users/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "correct-horse"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["id"], me["id"]);
}

#[tokio::test]
async fn test_bad_credentials_and_missing_token() {
    let app = TestApp::new().await;
    app.register("ada@example.com").await;

    let (status, headers, body) = app
        .request_full(
            Method::POST,
            "/users/login",
            None,
            Some(json!({"email": "ada@example.com", "password": "wrong-horse"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    assert_eq!(body["error"], "Incorrect email or password");

    let (status, _) = app.request(Method::GET, "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(Method::GET, "/users/me", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_validation() {
    let app = TestApp::new().await;
    app.register("ada@example.com").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/users/",
            None,
            Some(json!({
                "email": "ADA@example.com",
                "password": "another-pass",
                "first_name": "A",
                "last_name": "B"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email already registered");

    let (status, body) = app
        .request(
            Method::POST,
            "/users/",
            None,
            Some(json!({
                "email": "grace@example.com",
                "password": "12345",
                "first_name": "Grace",
                "last_name": "Hopper"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "password");

    let (status, body) = app
        .request(
            Method::POST,
            "/users/",
            None,
            Some(json!({
                "email": "not-an-email",
                "password": "123456",
                "first_name": "Grace",
                "last_name": "Hopper"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "email");

    let (status, _) = app
        .request(Method::POST, "/users/", None, Some(json!({"email": "x@y.z"})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_api_keys_are_masked_and_clearable() {
    let app = TestApp::new().await;
    let token = app.register("ada@example.com").await;

    let (status, body) = app
        .request(Method::GET, "/users/api-keys", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["openai_api_key"].is_null());

    let (status, body) = app
        .request(
            Method::PUT,
            "/users/api-keys",
            Some(&token),
            Some(json!({"openai_api_key": "sk-proj-abcdef987654", "google_api_key": "short"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["openai_api_key"], "sk-p...7654");
    assert_eq!(body["google_api_key"], "****");
    assert!(body["anthropic_api_key"].is_null());

    // Absent fields stay, empty strings clear.
    let (status, body) = app
        .request(
            Method::PUT,
            "/users/api-keys",
            Some(&token),
            Some(json!({"google_api_key": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["openai_api_key"], "sk-p...7654");
    assert!(body["google_api_key"].is_null());
}
