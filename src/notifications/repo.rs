use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Post,
    PostLike,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Post => "post",
            NotificationKind::PostLike => "post_like",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub data: Value,
    pub is_read: bool,
    pub created_at: OffsetDateTime,
}

/// Input to the fan-out engine, one row per recipient.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
    pub data: Value,
}

/// Persistence seam of the fan-out engine, injected so tests can count rows
/// without a database.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &NewNotification) -> anyhow::Result<Notification>;

    /// Broadcast recipient set: every user except the acting one, in
    /// creation order so the first recipient is stable.
    async fn recipients_except(&self, actor: Uuid) -> anyhow::Result<Vec<Uuid>>;
}

pub struct PgNotificationStore {
    db: PgPool,
}

impl PgNotificationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, notification: &NewNotification) -> anyhow::Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, kind, message, link, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, kind, message, link, data, is_read, created_at
            "#,
        )
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(&notification.link)
        .bind(&notification.data)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn recipients_except(&self, actor: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE id != $1 ORDER BY created_at")
                .bind(actor)
                .fetch_all(&self.db)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Latest activity for the bell dropdown, with the triggering user's display
/// fields joined in.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NotificationItem {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub data: Value,
    pub is_read: bool,
    pub created_at: OffsetDateTime,
    pub actor_name: Option<String>,
    pub actor_avatar: Option<String>,
}

pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<NotificationItem>> {
    let rows = sqlx::query_as::<_, NotificationItem>(
        r#"
        SELECT n.id, n.kind, n.message, n.link, n.data, n.is_read, n.created_at,
               actor.full_name AS actor_name, actor.avatar_url AS actor_avatar
        FROM notifications n
        LEFT JOIN users actor ON actor.id = (n.data->>'user_id')::uuid
        WHERE n.user_id = $1
        ORDER BY n.created_at DESC
        LIMIT 50
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn mark_read(
    db: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<Notification>> {
    let row = sqlx::query_as::<_, Notification>(
        r#"
        UPDATE notifications
        SET is_read = TRUE
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, kind, message, link, data, is_read, created_at
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn mark_all_read(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_all(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_discriminators_match_stored_values() {
        assert_eq!(NotificationKind::Post.as_str(), "post");
        assert_eq!(NotificationKind::PostLike.as_str(), "post_like");
    }
}
