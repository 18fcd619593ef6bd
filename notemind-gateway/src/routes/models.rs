use axum::Json;
use notemind_core::api::{ModelEntry, ModelsResponse};
use notemind_core::model_registry;
use serde_json::{Value, json};

/// GET /models
pub async fn list_models() -> Json<ModelsResponse> {
    let models = model_registry::all()
        .iter()
        .map(|spec| ModelEntry {
            id: spec.model.to_string(),
            name: spec.display_name.to_string(),
            provider: spec.provider,
            context_window: spec.context_window,
        })
        .collect();
    Json(ModelsResponse { models })
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "NoteMind API is running" }))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
