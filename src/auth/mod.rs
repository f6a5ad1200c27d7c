use std::{sync::Arc, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::{get, post},
    Router,
};

use crate::{
    config::AppConfig,
    ratelimit::{self, RateLimiter},
    state::AppState,
};

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;

pub fn router(config: &AppConfig) -> Router<AppState> {
    let enabled = !config.disable_rate_limit;
    let prod = config.is_production();

    let login_limiter = Arc::new(RateLimiter::new(
        if prod { 5 } else { 20 },
        Duration::from_secs(15 * 60),
        "Too many login attempts, please try again after 15 minutes",
        enabled,
    ));
    let register_limiter = Arc::new(RateLimiter::new(
        if prod { 3 } else { 20 },
        Duration::from_secs(60 * 60),
        "Too many registration attempts, please try again after 1 hour",
        enabled,
    ));
    let forgot_limiter = Arc::new(RateLimiter::new(
        if prod { 3 } else { 10 },
        Duration::from_secs(60 * 60),
        "Too many password reset requests, please try again after 1 hour",
        enabled,
    ));

    Router::new()
        .merge(
            Router::new()
                .route("/register", post(handlers::register))
                .route_layer(middleware::from_fn(move |req: Request, next: Next| {
                    ratelimit::enforce(register_limiter.clone(), req, next)
                })),
        )
        .merge(
            Router::new()
                .route("/login", post(handlers::login))
                .route_layer(middleware::from_fn(move |req: Request, next: Next| {
                    ratelimit::enforce(login_limiter.clone(), req, next)
                })),
        )
        .merge(
            Router::new()
                .route("/forgot-password", post(handlers::forgot_password))
                .route_layer(middleware::from_fn(move |req: Request, next: Next| {
                    ratelimit::enforce(forgot_limiter.clone(), req, next)
                })),
        )
        .route("/logout", post(handlers::logout))
        .route("/refresh-token", post(handlers::refresh_token))
        .route("/profile", get(handlers::profile))
        .route("/verify-email/:token", get(handlers::verify_email))
        .route("/resend-verification", post(handlers::resend_verification))
        .route(
            "/reset-password/:token",
            get(handlers::validate_reset_token).post(handlers::reset_password),
        )
}
