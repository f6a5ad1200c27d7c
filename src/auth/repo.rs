use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Editor,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Role {
        match value {
            "admin" => Role::Admin,
            "editor" => Role::Editor,
            _ => Role::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }
}

/// Identity record. Reset-token columns are handled by dedicated queries and
/// deliberately kept out of this projection.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub role: String,
    pub is_verified: bool,
    pub is_locked: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const USER_COLUMNS: &str = r#"
    id, username, email, password_hash, full_name, avatar_url, bio,
    role, is_verified, is_locked, created_at, updated_at
"#;

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    /// Account status derived from the lock flag, never stored redundantly.
    pub fn status(&self) -> &'static str {
        if self.is_locked {
            "locked"
        } else {
            "active"
        }
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn email_or_username_taken(
        db: &PgPool,
        email: &str,
        username: &str,
    ) -> anyhow::Result<bool> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = $1 OR username = $2")
                .bind(email)
                .bind(username)
                .fetch_optional(db)
                .await?;
        Ok(row.is_some())
    }

    /// Creates an unverified account with the default `user` role.
    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, role, is_verified)
            VALUES ($1, $2, $3, $4, 'user', FALSE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn mark_verified(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn set_reset_token(
        db: &PgPool,
        email: &str,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_password_token = $1, reset_password_expires = $2
            WHERE email = $3
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(email)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Rollback for a failed reset mail: the row loses its token again.
    pub async fn clear_reset_token(db: &PgPool, email: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_password_token = NULL, reset_password_expires = NULL
            WHERE email = $1
            "#,
        )
        .bind(email)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn find_by_valid_reset_token(
        db: &PgPool,
        token: &str,
    ) -> anyhow::Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM users
            WHERE reset_password_token = $1 AND reset_password_expires > NOW()
            "#,
        )
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Atomic consume-and-update: the token match, expiry check, password
    /// update and token clearing are one statement, so a second concurrent
    /// reset with the same token matches zero rows.
    pub async fn reset_password(
        db: &PgPool,
        token: &str,
        password_hash: &str,
    ) -> anyhow::Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE users
            SET password_hash = $1,
                reset_password_token = NULL,
                reset_password_expires = NULL,
                updated_at = NOW()
            WHERE reset_password_token = $2 AND reset_password_expires > NOW()
            RETURNING id
            "#,
        )
        .bind(password_hash)
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(row.map(|(id,)| id))
    }
}

/// Append-only login audit trail.
pub async fn record_session(
    db: &PgPool,
    user_id: Uuid,
    ip_address: &str,
    user_agent: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_sessions (user_id, ip_address, user_agent)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(ip_address)
    .bind(user_agent)
    .execute(db)
    .await?;
    Ok(())
}
