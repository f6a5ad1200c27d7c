use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// The slice of the external article domain the like path needs: enough to
/// address the author and phrase the notification.
#[derive(Debug, Clone, FromRow)]
pub struct PostSummary {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostLike {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
}

pub async fn find_post(db: &PgPool, post_id: Uuid) -> anyhow::Result<Option<PostSummary>> {
    let post = sqlx::query_as::<_, PostSummary>(
        "SELECT id, author_id, title FROM posts WHERE id = $1",
    )
    .bind(post_id)
    .fetch_optional(db)
    .await?;
    Ok(post)
}

pub async fn list_for_post(db: &PgPool, post_id: Uuid) -> anyhow::Result<Vec<PostLike>> {
    let likes = sqlx::query_as::<_, PostLike>(
        "SELECT id, post_id, user_id, created_at FROM post_likes WHERE post_id = $1",
    )
    .bind(post_id)
    .fetch_all(db)
    .await?;
    Ok(likes)
}

/// Duplicate-safe insert; reports whether a new like row was created.
pub async fn add(db: &PgPool, post_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO post_likes (post_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (post_id, user_id) DO NOTHING
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove(db: &PgPool, post_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
