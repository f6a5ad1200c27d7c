use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::{success, success_message, success_with, ApiError},
    notifications::repo,
    state::AppState,
};

#[instrument(skip(state, user))]
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let activities = repo::list_for_user(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch notifications", e))?;
    Ok(success(json!({ "activities": activities })))
}

#[instrument(skip(state, user))]
pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let notification = repo::mark_read(&state.db, id, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to mark notification as read", e))?
        .ok_or_else(|| ApiError::not_found("Notification not found"))?;
    Ok(success(json!({ "notification": notification })))
}

#[instrument(skip(state, user))]
pub async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    repo::mark_all_read(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to mark all notifications as read", e))?;
    Ok(success_message("All notifications marked as read"))
}

#[instrument(skip(state, user))]
pub async fn delete_one(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let deleted = repo::delete(&state.db, id, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete notification", e))?;
    if !deleted {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(success_message("Notification deleted successfully"))
}

#[instrument(skip(state, user))]
pub async fn delete_all(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let deleted = repo::delete_all(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete all notifications", e))?;
    Ok(success_with(
        "All notifications deleted successfully",
        json!({ "deletedCount": deleted }),
    ))
}
