use axum::{
    extract::{FromRef, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            EmailRequest, LoginRequest, Profile, RefreshRequest, RegisterRequest, RegisteredUser,
            ResetPasswordRequest, SessionUser,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        password::{hash_password, validate_password_strength, verify_password},
        repo::{self, User},
    },
    error::{success, success_message, success_with, ApiError},
    mailer::{reset_password_email, verification_email},
    state::AppState,
    tokens::{self, ConsumeError, TokenKind, RESET_PASSWORD_TTL, VERIFICATION_TTL},
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.username = payload.username.trim().to_string();

    if payload.username.len() < 3 {
        return Err(ApiError::validation(
            "Username must be at least 3 characters long",
        ));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::validation("Invalid email format"));
    }
    validate_password_strength(&payload.password).map_err(ApiError::validation)?;
    if let Some(name) = &payload.full_name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("Full name cannot be empty"));
        }
    }

    let taken = User::email_or_username_taken(&state.db, &payload.email, &payload.username)
        .await
        .map_err(|e| ApiError::internal("Registration failed", e))?;
    if taken {
        return Err(ApiError::conflict("Email or username already exists"));
    }

    let hash = hash_password(&payload.password)
        .map_err(|e| ApiError::internal("Registration failed", e))?;
    let user = User::create(
        &state.db,
        &payload.username,
        &payload.email,
        &hash,
        payload.full_name.as_deref(),
    )
    .await
    .map_err(|e| ApiError::internal("Registration failed", e))?;

    let verification_token = tokens::issue(
        &state.db,
        user.id,
        TokenKind::EmailVerification,
        VERIFICATION_TTL,
    )
    .await
    .map_err(|e| ApiError::internal("Registration failed", e))?;

    // Delivery failure does not roll the account back: the user can still
    // verify through a resend.
    let (subject, html) = verification_email(&state.config.frontend_url, &verification_token);
    if let Err(e) = state.mailer.send(&user.email, &subject, &html).await {
        warn!(error = %e, user_id = %user.id, "verification email failed, resend still possible");
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys
        .sign_access(user.id)
        .map_err(|e| ApiError::internal("Registration failed", e))?;
    let refresh_token = keys
        .sign_refresh(user.id)
        .map_err(|e| ApiError::internal("Registration failed", e))?;
    tokens::store_refresh(&state.db, user.id, &refresh_token, keys.refresh_expires_at())
        .await
        .map_err(|e| ApiError::internal("Registration failed", e))?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        success_with(
            "Registration successful. Please check your email to verify your account.",
            json!({
                "user": RegisteredUser::from(&user),
                "accessToken": access_token,
                "refreshToken": refresh_token,
            }),
        ),
    ))
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let username = payload
        .username
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    // Explicit email wins over username.
    let user = match (email, username) {
        (Some(email), _) => User::find_by_email(&state.db, &email.to_lowercase()).await,
        (None, Some(username)) => User::find_by_username(&state.db, username).await,
        (None, None) => {
            return Err(ApiError::validation("Please provide email or username"));
        }
    }
    .map_err(|e| ApiError::internal("Login failed", e))?;

    // Unknown account and wrong password share one response body.
    let user = user.ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    if user.is_locked {
        return Err(ApiError::forbidden(
            "This account has been locked. Please contact the administrator",
        ));
    }

    let password_ok = verify_password(&payload.password, &user.password_hash)
        .map_err(|e| ApiError::internal("Login failed", e))?;
    if !password_ok {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    if !user.is_verified {
        return Err(ApiError::requires_verification(
            "Please verify your email before logging in. Check your email for the verification link.",
        ));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys
        .sign_access(user.id)
        .map_err(|e| ApiError::internal("Login failed", e))?;
    let refresh_token = keys
        .sign_refresh(user.id)
        .map_err(|e| ApiError::internal("Login failed", e))?;
    tokens::store_refresh(&state.db, user.id, &refresh_token, keys.refresh_expires_at())
        .await
        .map_err(|e| ApiError::internal("Login failed", e))?;

    repo::record_session(
        &state.db,
        user.id,
        &client_ip(&headers),
        &user_agent(&headers),
    )
    .await
    .map_err(|e| ApiError::internal("Login failed", e))?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(success_with(
        "Login successful",
        json!({
            "user": SessionUser::from(&user),
            "accessToken": access_token,
            "refreshToken": refresh_token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = tokens::find_valid_refresh(&state.db, &payload.refresh_token)
        .await
        .map_err(|e| ApiError::internal("Failed to refresh token", e))?
        .ok_or_else(|| ApiError::unauthorized("Refresh token is invalid or expired"))?;

    // The refresh token itself is not rotated; only a new access token is
    // minted.
    let keys = JwtKeys::from_ref(&state);
    let access_token = keys
        .sign_access(user_id)
        .map_err(|e| ApiError::internal("Failed to refresh token", e))?;

    Ok(success(json!({ "accessToken": access_token })))
}

#[instrument(skip(state, user))]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, ApiError> {
    let revoked = tokens::revoke_refresh_tokens(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Logout failed", e))?;
    info!(user_id = %user.id, revoked, "user logged out");
    Ok(success_message("Logout successful"))
}

#[instrument(skip(user))]
pub async fn profile(CurrentUser(user): CurrentUser) -> Result<Json<Value>, ApiError> {
    Ok(success(json!({ "user": Profile::from(&user) })))
}

#[instrument(skip(state))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match tokens::consume(&state.db, &token, TokenKind::EmailVerification).await {
        Ok(user_id) => {
            let user = User::find_by_id(&state.db, user_id)
                .await
                .map_err(|e| {
                    ApiError::internal("An error occurred while verifying your email", e)
                })?
                .ok_or_else(|| {
                    ApiError::validation("Verification link is invalid or has expired")
                })?;

            if user.is_verified {
                // The stale token was already purged by the consume above.
                return Err(ApiError::validation("Email has already been verified"));
            }

            User::mark_verified(&state.db, user.id).await.map_err(|e| {
                ApiError::internal("An error occurred while verifying your email", e)
            })?;
            info!(user_id = %user.id, "email verified");
            Ok(success_message("Email verified successfully"))
        }
        Err(ConsumeError::TypeMismatch) => {
            Err(ApiError::validation("Invalid verification link type"))
        }
        Err(ConsumeError::Expired { user_id }) => {
            let already_verified = User::find_by_id(&state.db, user_id)
                .await
                .map_err(|e| {
                    ApiError::internal("An error occurred while verifying your email", e)
                })?
                .map(|u| u.is_verified)
                .unwrap_or(false);
            if already_verified {
                Err(ApiError::validation("Email has already been verified"))
            } else {
                Err(ApiError::validation(
                    "Verification link has expired. Please request a new verification email.",
                ))
            }
        }
        Err(ConsumeError::NotFound) => Err(ApiError::validation(
            "Verification link is invalid or has expired",
        )),
        Err(ConsumeError::Db(e)) => Err(ApiError::internal(
            "An error occurred while verifying your email",
            e,
        )),
    }
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<Value>, ApiError> {
    if !is_valid_email(payload.email.trim()) {
        return Err(ApiError::validation("Invalid email format"));
    }
    let email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &email)
        .await
        .map_err(|e| ApiError::internal("An error occurred while sending verification email", e))?
        .ok_or_else(|| ApiError::not_found("Email not found"))?;

    if user.is_verified {
        return Err(ApiError::validation("Email has already been verified"));
    }

    tokens::revoke_all(&state.db, user.id, TokenKind::EmailVerification)
        .await
        .map_err(|e| ApiError::internal("An error occurred while sending verification email", e))?;
    let token = tokens::issue(
        &state.db,
        user.id,
        TokenKind::EmailVerification,
        VERIFICATION_TTL,
    )
    .await
    .map_err(|e| ApiError::internal("An error occurred while sending verification email", e))?;

    let (subject, html) = verification_email(&state.config.frontend_url, &token);
    if let Err(send_err) = state.mailer.send(&user.email, &subject, &html).await {
        // Unlike register, the whole point of this call is the email, so the
        // fresh token is rolled back and the operation fails.
        if let Err(revoke_err) = tokens::revoke(&state.db, &token).await {
            warn!(error = %revoke_err, "failed to roll back verification token");
        }
        return Err(ApiError::internal(
            "Failed to send verification email. Please try again later.",
            send_err,
        ));
    }

    Ok(success_message("Verification email has been sent"))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<Value>, ApiError> {
    if !is_valid_email(payload.email.trim()) {
        return Err(ApiError::validation("Invalid email format"));
    }
    let email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &email)
        .await
        .map_err(|e| ApiError::internal("An error occurred", e))?
        .ok_or_else(|| ApiError::not_found("Email not found"))?;

    let token = tokens::generate_token();
    let expires_at = OffsetDateTime::now_utc() + RESET_PASSWORD_TTL;
    User::set_reset_token(&state.db, &email, &token, expires_at)
        .await
        .map_err(|e| ApiError::internal("An error occurred", e))?;

    let (subject, html) = reset_password_email(&state.config.frontend_url, &token);
    if let Err(send_err) = state.mailer.send(&user.email, &subject, &html).await {
        // Roll the token back so a failed delivery leaves no live reset link.
        if let Err(clear_err) = User::clear_reset_token(&state.db, &email).await {
            warn!(error = %clear_err, "failed to roll back reset token");
        }
        return Err(ApiError::internal("Failed to send email", send_err));
    }

    Ok(success_message(
        "Password reset link has been sent to your email",
    ))
}

#[instrument(skip(state))]
pub async fn validate_reset_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let found = User::find_by_valid_reset_token(&state.db, &token)
        .await
        .map_err(|e| ApiError::internal("Failed to validate token", e))?;
    match found {
        Some(_) => Ok(success_message("Token is valid")),
        None => Err(ApiError::validation(
            "Reset password link is invalid or expired",
        )),
    }
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_password_strength(&payload.password).map_err(ApiError::validation)?;

    // Cheap pre-check so dead tokens never pay for a hash; the update below
    // re-checks atomically.
    let candidate = User::find_by_valid_reset_token(&state.db, &token)
        .await
        .map_err(|e| ApiError::internal("An error occurred while resetting your password", e))?;
    if candidate.is_none() {
        return Err(ApiError::validation(
            "Reset password link is invalid or has expired",
        ));
    }

    let hash = hash_password(&payload.password)
        .map_err(|e| ApiError::internal("An error occurred while resetting your password", e))?;

    let updated = User::reset_password(&state.db, &token, &hash)
        .await
        .map_err(|e| ApiError::internal("An error occurred while resetting your password", e))?;
    match updated {
        Some(user_id) => {
            info!(%user_id, "password reset");
            Ok(success_message("Password has been reset successfully"))
        }
        // A concurrent reset consumed the token between the pre-check and
        // the update; the atomic WHERE clause makes sure only one wins.
        None => Err(ApiError::validation(
            "Reset password link is invalid or has expired",
        )),
    }
}
