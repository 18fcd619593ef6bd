//! Folder endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use notemind_core::api::{FolderRequest, FolderResponse};
use notemind_db::FolderRepository;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{Pagination, folder_response, owned_folder};
use crate::state::AppState;

pub const MAX_FOLDER_NAME_CHARS: usize = 100;

fn folder_name(request: &FolderRequest) -> ApiResult<&str> {
    let name = request.name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_FOLDER_NAME_CHARS {
        return Err(ApiError::validation(
            "name",
            format!("name must be 1 to {MAX_FOLDER_NAME_CHARS} characters"),
        ));
    }
    Ok(name)
}

/// POST /folders
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<FolderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FolderResponse>)> {
    let Json(request) = body?;
    let folder = FolderRepository::create(state.pool(), &user.user_id, folder_name(&request)?).await?;
    Ok((StatusCode::CREATED, Json(folder_response(folder))))
}

/// GET /folders
pub async fn list_folders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    query: Result<Query<Pagination>, QueryRejection>,
) -> ApiResult<Json<Vec<FolderResponse>>> {
    let Query(page) = query?;
    let (skip, limit) = page.resolve()?;
    let folders = FolderRepository::list_for_user(state.pool(), &user.user_id, skip, limit).await?;
    Ok(Json(folders.into_iter().map(folder_response).collect()))
}

/// GET /folders/{id}
pub async fn get_folder(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<FolderResponse>> {
    Ok(Json(folder_response(owned_folder(&state, &user, &id).await?)))
}

/// PATCH /folders/{id}
pub async fn rename_folder(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<FolderRequest>, JsonRejection>,
) -> ApiResult<Json<FolderResponse>> {
    let Json(request) = body?;
    let name = folder_name(&request)?;
    owned_folder(&state, &user, &id).await?;
    let folder = FolderRepository::rename(state.pool(), &id, name)
        .await?
        .ok_or_else(|| ApiError::not_found("Folder"))?;
    Ok(Json(folder_response(folder)))
}

/// DELETE /folders/{id}
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    owned_folder(&state, &user, &id).await?;
    FolderRepository::delete(state.pool(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> FolderRequest {
        FolderRequest {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_folder_name_bounds() {
        assert_eq!(folder_name(&request("  Work ")).unwrap(), "Work");
        assert!(folder_name(&request("   ")).is_err());
        assert!(folder_name(&request(&"n".repeat(100))).is_ok());
        assert!(folder_name(&request(&"n".repeat(101))).is_err());
    }
}
