use rand::{rngs::OsRng, RngCore};
use sqlx::PgPool;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Kinds of opaque single-use tokens persisted in `verification_tokens`.
/// Reset-password tokens live on the user row instead and refresh tokens
/// have their own multi-issue table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EmailVerification,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
        }
    }
}

pub const VERIFICATION_TTL: Duration = Duration::hours(24);
pub const RESET_PASSWORD_TTL: Duration = Duration::hours(1);

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("token not found")]
    NotFound,
    #[error("token has expired")]
    Expired { user_id: Uuid },
    #[error("token type mismatch")]
    TypeMismatch,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// 32 bytes from the OS RNG, hex encoded. Entropy is large enough that
/// collisions are not checked separately.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub async fn issue(
    db: &PgPool,
    user_id: Uuid,
    kind: TokenKind,
    ttl: Duration,
) -> anyhow::Result<String> {
    let token = generate_token();
    let expires_at = OffsetDateTime::now_utc() + ttl;
    sqlx::query(
        r#"
        INSERT INTO verification_tokens (user_id, token, kind, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(&token)
    .bind(kind.as_str())
    .bind(expires_at)
    .execute(db)
    .await?;
    Ok(token)
}

/// Consumes a single-use token. The happy path validates and deletes in one
/// statement, so two concurrent consumers cannot both succeed. The miss path
/// only diagnoses (not-found vs wrong-kind vs expired) and never mutates.
pub async fn consume(db: &PgPool, token: &str, kind: TokenKind) -> Result<Uuid, ConsumeError> {
    let consumed: Option<(Uuid,)> = sqlx::query_as(
        r#"
        DELETE FROM verification_tokens
        WHERE token = $1 AND kind = $2 AND expires_at > NOW()
        RETURNING user_id
        "#,
    )
    .bind(token)
    .bind(kind.as_str())
    .fetch_optional(db)
    .await?;

    if let Some((user_id,)) = consumed {
        return Ok(user_id);
    }

    let row: Option<(String, Uuid)> = sqlx::query_as(
        r#"SELECT kind, user_id FROM verification_tokens WHERE token = $1"#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    match row {
        None => Err(ConsumeError::NotFound),
        Some((stored_kind, _)) if stored_kind != kind.as_str() => Err(ConsumeError::TypeMismatch),
        Some((_, user_id)) => Err(ConsumeError::Expired { user_id }),
    }
}

/// Drops every token of `kind` held by the user, used before re-issuance.
pub async fn revoke_all(db: &PgPool, user_id: Uuid, kind: TokenKind) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"DELETE FROM verification_tokens WHERE user_id = $1 AND kind = $2"#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Rolls back a freshly issued token, e.g. when the mail carrying it could
/// not be delivered.
pub async fn revoke(db: &PgPool, token: &str) -> anyhow::Result<()> {
    sqlx::query(r#"DELETE FROM verification_tokens WHERE token = $1"#)
        .bind(token)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn store_refresh(
    db: &PgPool,
    user_id: Uuid,
    token: &str,
    expires_at: OffsetDateTime,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(token)
    .bind(expires_at)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_valid_refresh(db: &PgPool, token: &str) -> anyhow::Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"SELECT user_id FROM refresh_tokens WHERE token = $1 AND expires_at > NOW()"#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|(user_id,)| user_id))
}

/// Coarse-grained logout: every refresh token the user holds is dropped.
pub async fn revoke_refresh_tokens(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
    let result = sqlx::query(r#"DELETE FROM refresh_tokens WHERE user_id = $1"#)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_tokens_do_not_repeat() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn kind_maps_to_stored_discriminator() {
        assert_eq!(TokenKind::EmailVerification.as_str(), "email_verification");
    }
}
