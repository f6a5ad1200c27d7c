use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::{
    auth::{
        jwt::{JwtKeys, TokenKind},
        repo::{Role, User},
    },
    error::ApiError,
    state::AppState,
};

/// Authenticated caller, resolved to the full user record. Rejects with 401
/// for any token problem and 403 for missing or locked accounts.
pub struct CurrentUser(pub User);

/// Same resolution as [`CurrentUser`], but every failure silently yields
/// `None`; downstream logic branches on presence itself.
pub struct MaybeUser(pub Option<User>);

/// [`CurrentUser`] narrowed to the admin role.
pub struct AdminUser(pub User);

/// [`CurrentUser`] narrowed to editors and admins.
pub struct EditorUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
}

fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.role() != Role::Admin {
        return Err(ApiError::forbidden(
            "You do not have permission to access this resource",
        ));
    }
    Ok(())
}

fn require_editor(user: &User) -> Result<(), ApiError> {
    if !matches!(user.role(), Role::Editor | Role::Admin) {
        return Err(ApiError::forbidden("Access denied"));
    }
    Ok(())
}

async fn resolve_user(parts: &Parts, state: &AppState) -> Result<User, ApiError> {
    let token = bearer_token(parts)
        .ok_or_else(|| ApiError::unauthorized("Authentication token not found"))?;

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(token).map_err(|e| {
        // Malformed and expired are not distinguished to the client.
        warn!(error = %e, "access token rejected");
        ApiError::unauthorized("Token is invalid or expired. Please log in again")
    })?;

    if claims.kind != TokenKind::Access {
        return Err(ApiError::unauthorized(
            "Token is invalid or expired. Please log in again",
        ));
    }

    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(|e| ApiError::internal("Failed to verify user information", e))?
        .ok_or_else(|| ApiError::forbidden("User account not found"))?;

    if user.is_locked {
        return Err(ApiError::forbidden(
            "Your account has been locked. Please contact the administrator",
        ));
    }

    Ok(user)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state).await.map(CurrentUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(resolve_user(parts, state).await.ok()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = resolve_user(parts, state).await?;
        require_admin(&user)?;
        Ok(AdminUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for EditorUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = resolve_user(parts, state).await?;
        require_editor(&user)?;
        Ok(EditorUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header(axum::http::header::AUTHORIZATION, v);
        }
        let (parts, ()) = builder.body(()).expect("request").into_parts();
        parts
    }

    #[test]
    fn bearer_token_requires_scheme_prefix() {
        assert_eq!(
            bearer_token(&parts_with_auth(Some("Bearer abc"))),
            Some("abc")
        );
        assert_eq!(
            bearer_token(&parts_with_auth(Some("bearer abc"))),
            Some("abc")
        );
        assert_eq!(bearer_token(&parts_with_auth(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with_auth(None)), None);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let state = AppState::fake();
        let err = resolve_user(&parts_with_auth(None), &state)
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let state = AppState::fake();
        let err = resolve_user(&parts_with_auth(Some("Bearer nonsense")), &state)
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_is_not_accepted_as_access() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let refresh = keys.sign_refresh(uuid::Uuid::new_v4()).expect("sign");
        let err = resolve_user(
            &parts_with_auth(Some(&format!("Bearer {refresh}"))),
            &state,
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    fn user_with_role(role: &str) -> User {
        User {
            id: uuid::Uuid::new_v4(),
            username: "alice".into(),
            email: "a@x.com".into(),
            password_hash: "hash".into(),
            full_name: None,
            avatar_url: None,
            bio: None,
            role: role.into(),
            is_verified: true,
            is_locked: false,
            created_at: time::OffsetDateTime::now_utc(),
            updated_at: time::OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn admin_gate_rejects_everyone_else() {
        assert!(require_admin(&user_with_role("admin")).is_ok());
        assert!(require_admin(&user_with_role("editor")).is_err());
        assert!(require_admin(&user_with_role("user")).is_err());
    }

    #[test]
    fn editor_gate_admits_editors_and_admins() {
        assert!(require_editor(&user_with_role("admin")).is_ok());
        assert!(require_editor(&user_with_role("editor")).is_ok());
        let err = require_editor(&user_with_role("user")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn maybe_user_swallows_failures() {
        let state = AppState::fake();
        let mut parts = parts_with_auth(Some("Bearer nonsense"));
        let MaybeUser(user) = MaybeUser::from_request_parts(&mut parts, &state)
            .await
            .expect("infallible");
        assert!(user.is_none());
    }
}
