//! services/api/src/web/middleware.rs
//!
//! Session middleware for every stage route.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use study_gate_core::domain::Session;
use tracing::{debug, error};

use crate::web::state::AppState;

/// Middleware that resolves the signed session cookie to a `Session`.
///
/// The session is inserted into request extensions for handlers to use. A
/// missing, tampered or expired cookie gets a fresh unauthenticated session,
/// and the response carries a cookie for it. Handlers persist any changes.
pub async fn attach_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Verify the cookie and look the session up
    let existing = match state.cookie.session_id(req.headers()) {
        Some(session_id) => state.sessions.load(session_id).await.map_err(|e| {
            error!("Failed to load session: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?,
        None => None,
    };

    // 2. Fall back to a fresh session
    let (session, is_new) = match existing {
        Some(session) => (session, false),
        None => (Session::new(), true),
    };
    let session_id = session.id;
    if is_new {
        debug!(%session_id, "Starting new session");
    }

    // 3. Hand the session to the handler
    req.extensions_mut().insert(session);
    let mut response = next.run(req).await;

    // 4. Issue the cookie for new sessions unless the handler set its own
    if is_new && !response.headers().contains_key(header::SET_COOKIE) {
        let cookie = HeaderValue::from_str(&state.cookie.set_cookie(session_id)).map_err(|e| {
            error!("Failed to build session cookie: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    Ok(response)
}
