mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_folder_crud_and_conversation_filing() {
    let app = TestApp::new().await;
    let token = app.register_with_keys("ada@example.com").await;

    let (status, folder) = app
        .request(Method::POST, "/folders", Some(&token), Some(json!({"name": " Research "})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(folder["name"], "Research");
    let folder_id = folder["id"].as_str().unwrap();

    let (status, _) = app
        .request(Method::POST, "/folders", Some(&token), Some(json!({"name": "research"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(Method::POST, "/folders", Some(&token), Some(json!({"name": ""})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "name");

    let (status, filed) = app
        .request(
            Method::POST,
            "/conversations",
            Some(&token),
            Some(json!({
                "provider": "anthropic",
                "model_name": "claude-3-5-sonnet",
                "first_message": "Filed away",
                "folder_id": folder_id
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(filed["folder_id"], folder_id);
    assert_eq!(filed["total_context_size"], 200000);
    // Non-OpenAI titles come from the conversation's own model.
    assert_eq!(app.factory.last_call().model, "claude-3-5-sonnet");

    let loose = app.create_conversation(&token, "Loose").await;

    let (_, in_folder) = app
        .request(
            Method::GET,
            &format!("/conversations?folder_id={folder_id}"),
            Some(&token),
            None,
        )
        .await;
    let in_folder = in_folder.as_array().unwrap();
    assert_eq!(in_folder.len(), 1);
    assert_eq!(in_folder[0]["id"], filed["id"]);

    let (_, unfiled) = app
        .request(Method::GET, "/conversations?folder_id=null", Some(&token), None)
        .await;
    let unfiled = unfiled.as_array().unwrap();
    assert_eq!(unfiled.len(), 1);
    assert_eq!(unfiled[0]["id"], loose["id"]);

    let (_, all) = app.request(Method::GET, "/conversations", Some(&token), None).await;
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 2);
    // Most recently updated first, without message bodies.
    assert_eq!(all[0]["id"], loose["id"]);
    assert!(all[0].get("messages").is_none());

    let (status, renamed) = app
        .request(
            Method::PATCH,
            &format!("/folders/{folder_id}"),
            Some(&token),
            Some(json!({"name": "Papers"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Papers");

    let (status, _) = app
        .request(Method::DELETE, &format!("/folders/{folder_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let filed_id = filed["id"].as_str().unwrap();
    app.request(Method::DELETE, &format!("/conversations/{filed_id}"), Some(&token), None)
        .await;
    let (status, _) = app
        .request(Method::DELETE, &format!("/folders/{folder_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, folders) = app.request(Method::GET, "/folders", Some(&token), None).await;
    assert!(folders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_folder_is_rejected() {
    let app = TestApp::new().await;
    let owner = app.register_with_keys("ada@example.com").await;
    let other = app.register_with_keys("eve@example.com").await;

    let (_, folder) = app
        .request(Method::POST, "/folders", Some(&owner), Some(json!({"name": "Mine"})))
        .await;
    let folder_id = folder["id"].as_str().unwrap();

    let (status, _) = app
        .request(Method::GET, &format!("/folders/{folder_id}"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::POST,
            "/conversations",
            Some(&other),
            Some(json!({
                "provider": "openai",
                "model_name": "gpt-4o",
                "first_message": "sneaky",
                "folder_id": folder_id
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::GET, "/folders/fold_missing", Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Same name is fine for a different user.
    let (status, _) = app
        .request(Method::POST, "/folders", Some(&other), Some(json!({"name": "Mine"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}
