use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

/// Error kinds returned by the business operations. A thin adapter maps each
/// kind to its HTTP status and the uniform `{status, message, ...}` envelope,
/// so the operations themselves never touch response plumbing.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{message}")]
    Forbidden {
        message: String,
        requires_verification: bool,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
            requires_verification: false,
        }
    }

    pub fn requires_verification(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
            requires_verification: true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Wraps an unexpected failure. `message` is the stable client-facing
    /// text; the source is logged server-side and exposed in the `details`
    /// field only outside production.
    pub fn internal(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn expose_details() -> bool {
    std::env::var("APP_ENV")
        .map(|v| v != "production")
        .unwrap_or(true)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "status": "error",
            "message": self.to_string(),
        });
        match &self {
            ApiError::Forbidden {
                requires_verification: true,
                ..
            } => {
                body["requiresVerification"] = json!(true);
            }
            ApiError::Internal { message, source } => {
                error!(error = %source, %message, "internal error");
                if expose_details() {
                    body["details"] = json!(source.to_string());
                }
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

pub fn success(data: Value) -> Json<Value> {
    Json(json!({ "status": "success", "data": data }))
}

pub fn success_message(message: &str) -> Json<Value> {
    Json(json!({ "status": "success", "message": message }))
}

pub fn success_with(message: &str, data: Value) -> Json<Value> {
    Json(json!({ "status": "success", "message": message, "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn statuses_match_taxonomy() {
        assert_eq!(
            ApiError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::conflict("dup").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::unauthorized("no").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::internal("boom", anyhow::anyhow!("db down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn unauthorized_bodies_are_byte_identical() {
        // Unknown account and wrong password must be indistinguishable.
        let a = ApiError::unauthorized("Invalid email or password").into_response();
        let b = ApiError::unauthorized("Invalid email or password").into_response();
        assert_eq!(a.status(), b.status());
        let a = to_bytes(a.into_body(), usize::MAX).await.expect("body a");
        let b = to_bytes(b.into_body(), usize::MAX).await.expect("body b");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn requires_verification_flag_is_surfaced() {
        let (status, body) = body_of(ApiError::requires_verification(
            "Please verify your email before logging in.",
        ))
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["requiresVerification"], json!(true));
        assert_eq!(body["status"], json!("error"));
    }

    #[tokio::test]
    async fn plain_forbidden_has_no_verification_flag() {
        let (_, body) = body_of(ApiError::forbidden("Access denied")).await;
        assert!(body.get("requiresVerification").is_none());
    }

    #[tokio::test]
    async fn success_envelope_shape() {
        let Json(body) = success_with("Login successful", json!({ "id": 1 }));
        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["message"], json!("Login successful"));
        assert_eq!(body["data"]["id"], json!(1));
    }
}
