use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::add))
        .route("/post/:post_id", get(handlers::list_for_post))
        .route("/:post_id", delete(handlers::remove))
}
