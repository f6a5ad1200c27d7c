use axum::{
    routing::{delete, get, put},
    Router,
};

use crate::state::AppState;

pub mod fanout;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list).delete(handlers::delete_all))
        .route("/read-all", put(handlers::mark_all_read))
        .route("/:id/read", put(handlers::mark_read))
        .route("/:id", delete(handlers::delete_one))
}
