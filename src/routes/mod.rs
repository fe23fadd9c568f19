mod api;
mod pages;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::student))
        .route("/teacher", get(pages::teacher))
        .route("/api/sessions", post(api::create_session))
        .route(
            "/api/sessions/:id",
            get(api::get_session).delete(api::end_session),
        )
        .route("/api/sessions/:id/submit", post(api::submit))
        .route("/api/sessions/:id/poll", get(api::poll))
        .route("/api/console/pending", get(api::list_pending))
        .route("/api/console/rows/:position/approve", post(api::approve))
        .route(
            "/api/console/rows/:position/regenerate",
            post(api::regenerate),
        )
        .with_state(state)
}
