pub mod cookie;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod stages;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use middleware::attach_session;
pub use state::AppState;

/// Builds the stage routes. Every route runs behind the session middleware.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(stages::ENTRY_PATH, post(stages::submit_code_handler))
        .route(
            stages::REGISTER_PATH,
            get(stages::registration_handler).post(stages::submit_registration_handler),
        )
        .route(
            stages::SCHEDULE_PATH,
            get(stages::schedule_handler).post(stages::submit_schedule_handler),
        )
        .route(stages::EXAM_PATH, get(stages::exam_handler))
        .route(stages::RESULTS_PATH, post(stages::submit_answers_handler))
        .route(stages::DASHBOARD_PATH, get(stages::dashboard_handler))
        .route(stages::CHAT_PATH, post(stages::chat_handler))
        .route(
            "/session",
            get(rest::session_status_handler).delete(rest::end_session_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            attach_session,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
