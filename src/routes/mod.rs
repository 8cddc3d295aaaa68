pub mod admin;
pub mod public;

use axum::{middleware, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{error::AppError, guard::session_guard, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/admin", admin::router())
        .nest_service(
            "/images",
            ServeDir::new(state.config.static_root.join("images")),
        )
        .fallback(|| async { AppError::NotFound })
        .layer(middleware::from_fn_with_state(
            state.guard.clone(),
            session_guard,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
