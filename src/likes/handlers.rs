use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::CurrentUser,
    error::{success, success_message, ApiError},
    likes::repo,
    notifications::fanout::Notifier,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    #[serde(rename = "postId")]
    pub post_id: Uuid,
}

#[instrument(skip(state))]
pub async fn list_for_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let likes = repo::list_for_post(&state.db, post_id)
        .await
        .map_err(|e| ApiError::internal("Error fetching likes", e))?;
    Ok(success(json!({ "likes": likes })))
}

#[instrument(skip(state, user))]
pub async fn add(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<LikeRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let post = repo::find_post(&state.db, payload.post_id)
        .await
        .map_err(|e| ApiError::internal("Error adding like", e))?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    let inserted = repo::add(&state.db, post.id, user.id)
        .await
        .map_err(|e| ApiError::internal("Error adding like", e))?;
    if !inserted {
        return Err(ApiError::validation("You have already liked this post"));
    }

    // Self-likes do not notify; the fan-out is best-effort either way.
    if post.author_id != user.id {
        let liker_name = user.full_name.as_deref().unwrap_or(&user.username);
        Notifier::from_state(&state)
            .post_liked(post.author_id, user.id, liker_name, post.id, &post.title)
            .await;
    }

    Ok((
        StatusCode::CREATED,
        success_message("Like added successfully"),
    ))
}

#[instrument(skip(state, user))]
pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let removed = repo::remove(&state.db, post_id, user.id)
        .await
        .map_err(|e| ApiError::internal("Error removing like", e))?;
    if !removed {
        return Err(ApiError::not_found("Like not found"));
    }
    Ok(success_message("Like removed successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_request_uses_camel_case_key() {
        let id = Uuid::new_v4();
        let parsed: LikeRequest =
            serde_json::from_value(json!({ "postId": id })).expect("deserialize");
        assert_eq!(parsed.post_id, id);
    }
}
