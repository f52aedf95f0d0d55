//! services/api/src/web/rest.rs
//!
//! Contains the session endpoints and the master definition for the OpenAPI
//! specification.

use crate::web::{
    protocol::{
        ChatRequest, ChatResponse, CodeRequest, CodeResponse, ExamResponse, FieldsView,
        PlanResponse, QuestionView, ResultResponse, StageAck, StatusResponse,
    },
    stages,
    state::AppState,
};
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use std::sync::Arc;
use study_gate_core::domain::Session;
use tracing::{error, info};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        stages::submit_code_handler,
        stages::registration_handler,
        stages::submit_registration_handler,
        stages::schedule_handler,
        stages::submit_schedule_handler,
        stages::exam_handler,
        stages::submit_answers_handler,
        stages::dashboard_handler,
        stages::chat_handler,
        session_status_handler,
        end_session_handler,
    ),
    components(
        schemas(
            CodeRequest,
            CodeResponse,
            StageAck,
            FieldsView,
            QuestionView,
            ExamResponse,
            ResultResponse,
            PlanResponse,
            ChatRequest,
            ChatResponse,
            StatusResponse
        )
    ),
    tags(
        (name = "Study Gate API", description = "Code-gated study flow: registration, schedule, assessment and study plan.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Session Handlers
//=========================================================================================

/// GET /session - Where the current session stands in the flow
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Current session status", body = StatusResponse)
    )
)]
pub async fn session_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<StatusResponse> {
    Json(state.flow.status(&session).into())
}

/// DELETE /session - Forget the session and clear its cookie
///
/// The code it was unlocked with stays consumed.
#[utoipa::path(
    delete,
    path = "/session",
    responses(
        (status = 204, description = "Session ended"),
        (status = 500, description = "Session store unavailable")
    )
)]
pub async fn end_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Response, (StatusCode, String)> {
    state.sessions.remove(session.id).await.map_err(|e| {
        error!("Failed to remove session: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to end session".to_string(),
        )
    })?;
    info!(session_id = %session.id, "Session ended");

    let cookie = HeaderValue::from_str(&state.cookie.clear_cookie()).map_err(|e| {
        error!("Failed to build session cookie: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to end session".to_string(),
        )
    })?;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}
