//! services/api/src/web/stages.rs
//!
//! Axum handlers for the stage endpoints: code entry, registration, schedule,
//! exam, results, dashboard and the chat bot.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Json,
};
use std::sync::Arc;
use study_gate_core::{
    domain::Session,
    flow::Redemption,
    ports::{PortError, SessionChange},
    stage::{Stage, StageOutcome},
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::web::{
    protocol::{
        into_field_map, ChatRequest, ChatResponse, CodeRequest, CodeResponse, ExamResponse,
        FieldsView, FormFields, PlanResponse, ResultResponse, StageAck,
    },
    state::AppState,
};

pub const ENTRY_PATH: &str = "/";
pub const REGISTER_PATH: &str = "/register";
pub const SCHEDULE_PATH: &str = "/schedule_info";
pub const EXAM_PATH: &str = "/exam";
pub const RESULTS_PATH: &str = "/analyze_results";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const CHAT_PATH: &str = "/ask-bot";

const REJECTED_CODE: &str = "The code is invalid or has already been used.";

type HandlerError = (StatusCode, String);

/// The page that renders `stage`.
pub fn stage_path(stage: Stage) -> &'static str {
    match stage {
        Stage::Unauthenticated => ENTRY_PATH,
        Stage::Registered => REGISTER_PATH,
        Stage::ScheduleCaptured => SCHEDULE_PATH,
        Stage::Assessed => EXAM_PATH,
        Stage::Scored => DASHBOARD_PATH,
    }
}

fn redirect(stage: Stage) -> Response {
    Redirect::to(stage_path(stage)).into_response()
}

fn storage_failure(e: PortError) -> HandlerError {
    error!("Session storage failure: {:?}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong. Please try again.".to_string(),
    )
}

async fn save(state: &AppState, session: Session) -> Result<(), HandlerError> {
    state.sessions.save(session).await.map_err(storage_failure)
}

/// Writes back only what a long-running handler changed. Other requests for
/// the same session may have saved while the content service was working.
async fn apply(state: &AppState, session_id: Uuid, change: SessionChange) -> Result<(), HandlerError> {
    let applied = state
        .sessions
        .update(session_id, change)
        .await
        .map_err(storage_failure)?;
    if !applied {
        debug!(%session_id, "Session ended before its update could be stored");
    }
    Ok(())
}

//=========================================================================================
// Entry
//=========================================================================================

/// POST / - Redeem an access code
#[utoipa::path(
    post,
    path = "/",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Code accepted, session unlocked", body = CodeResponse),
        (status = 403, description = "Code unknown or already used", body = CodeResponse),
        (status = 500, description = "Code store unavailable")
    )
)]
pub async fn submit_code_handler(
    State(state): State<Arc<AppState>>,
    Extension(mut session): Extension<Session>,
    Json(req): Json<CodeRequest>,
) -> Result<Response, HandlerError> {
    let redemption = state
        .flow
        .submit_code(&mut session, &req.access_code)
        .await
        .map_err(|e| {
            error!("Failed to redeem access code: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not check the code right now. Please try again.".to_string(),
            )
        })?;

    // Refused guesses are not stored.
    let response = match redemption {
        Redemption::Accepted => {
            save(&state, session).await?;
            (
                StatusCode::OK,
                Json(CodeResponse {
                    accepted: true,
                    next: Some(REGISTER_PATH.to_string()),
                    error: None,
                }),
            )
        }
        Redemption::Rejected => (
            StatusCode::FORBIDDEN,
            Json(CodeResponse {
                accepted: false,
                next: None,
                error: Some(REJECTED_CODE.to_string()),
            }),
        ),
    };
    Ok(response.into_response())
}

//=========================================================================================
// Registration and Schedule
//=========================================================================================

/// GET /register - The stored registration fields
#[utoipa::path(
    get,
    path = "/register",
    responses(
        (status = 200, description = "Current registration fields", body = FieldsView),
        (status = 303, description = "Session not unlocked; redirect to the entry stage")
    )
)]
pub async fn registration_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    match state.flow.registration(&session) {
        StageOutcome::Proceed(profile) => Json(FieldsView::from(profile.fields())).into_response(),
        StageOutcome::Redirect(to) => redirect(to),
    }
}

/// POST /register - Store registration fields
#[utoipa::path(
    post,
    path = "/register",
    request_body = std::collections::BTreeMap<String, String>,
    responses(
        (status = 200, description = "Registration stored", body = StageAck),
        (status = 303, description = "Session not unlocked; redirect to the entry stage")
    )
)]
pub async fn submit_registration_handler(
    State(state): State<Arc<AppState>>,
    Extension(mut session): Extension<Session>,
    Json(form): Json<FormFields>,
) -> Result<Response, HandlerError> {
    match state.flow.submit_registration(&mut session, into_field_map(form)) {
        StageOutcome::Proceed(()) => {
            save(&state, session).await?;
            Ok(Json(StageAck {
                next: SCHEDULE_PATH.to_string(),
            })
            .into_response())
        }
        StageOutcome::Redirect(to) => Ok(redirect(to)),
    }
}

/// GET /schedule_info - The stored weekly routine
#[utoipa::path(
    get,
    path = "/schedule_info",
    responses(
        (status = 200, description = "Current routine fields", body = FieldsView),
        (status = 303, description = "Session not unlocked; redirect to the entry stage")
    )
)]
pub async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    match state.flow.schedule(&session) {
        StageOutcome::Proceed(routine) => Json(FieldsView::from(routine.fields())).into_response(),
        StageOutcome::Redirect(to) => redirect(to),
    }
}

/// POST /schedule_info - Store the weekly routine
#[utoipa::path(
    post,
    path = "/schedule_info",
    request_body = std::collections::BTreeMap<String, String>,
    responses(
        (status = 200, description = "Routine stored", body = StageAck),
        (status = 303, description = "Session not unlocked; redirect to the entry stage")
    )
)]
pub async fn submit_schedule_handler(
    State(state): State<Arc<AppState>>,
    Extension(mut session): Extension<Session>,
    Json(form): Json<FormFields>,
) -> Result<Response, HandlerError> {
    match state.flow.submit_schedule(&mut session, into_field_map(form)) {
        StageOutcome::Proceed(()) => {
            save(&state, session).await?;
            Ok(Json(StageAck {
                next: EXAM_PATH.to_string(),
            })
            .into_response())
        }
        StageOutcome::Redirect(to) => Ok(redirect(to)),
    }
}

//=========================================================================================
// Exam and Results
//=========================================================================================

/// GET /exam - Generate a fresh question set
///
/// An empty question list means generation failed; the student can reload to retry.
#[utoipa::path(
    get,
    path = "/exam",
    responses(
        (status = 200, description = "Questions for the student, without answers", body = ExamResponse),
        (status = 303, description = "Session not unlocked; redirect to the entry stage")
    )
)]
pub async fn exam_handler(
    State(state): State<Arc<AppState>>,
    Extension(mut session): Extension<Session>,
) -> Result<Response, HandlerError> {
    match state.flow.start_assessment(&mut session).await {
        StageOutcome::Proceed(questions) => {
            let body = ExamResponse::from_questions(&questions);
            let stage = session.stage;
            apply(
                &state,
                session.id,
                Box::new(move |stored: &mut Session| {
                    stored.questions = questions;
                    stored.advance_to(stage);
                }),
            )
            .await?;
            Ok(Json(body).into_response())
        }
        StageOutcome::Redirect(to) => Ok(redirect(to)),
    }
}

/// POST /analyze_results - Score answers and build the study plan
///
/// Answers are sent as `q0`, `q1`, ... with the elapsed seconds in `time_taken`.
#[utoipa::path(
    post,
    path = "/analyze_results",
    request_body = std::collections::BTreeMap<String, String>,
    responses(
        (status = 200, description = "Scored, with a generated plan", body = ResultResponse),
        (status = 303, description = "Redirect to the entry stage, or to the exam if there are no questions"),
        (status = 502, description = "Scored, but the plan could not be generated", body = ResultResponse)
    )
)]
pub async fn submit_answers_handler(
    State(state): State<Arc<AppState>>,
    Extension(mut session): Extension<Session>,
    Json(form): Json<FormFields>,
) -> Result<Response, HandlerError> {
    let fields = into_field_map(form);
    match state.flow.submit_answers(&mut session, &fields).await {
        StageOutcome::Proceed(scored) => {
            let degraded = scored.degraded;
            let Session {
                id, result, plan, stage, ..
            } = session;
            apply(
                &state,
                id,
                Box::new(move |stored: &mut Session| {
                    stored.result = result;
                    if !degraded {
                        stored.plan = plan;
                    }
                    stored.advance_to(stage);
                }),
            )
            .await?;
            let status = if scored.degraded {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::OK
            };
            let body = ResultResponse::new(&scored.result, scored.plan, scored.degraded, DASHBOARD_PATH);
            Ok((status, Json(body)).into_response())
        }
        StageOutcome::Redirect(to) => Ok(redirect(to)),
    }
}

/// GET /dashboard - The generated study plan
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "The plan; empty if none has been generated yet", body = PlanResponse),
        (status = 303, description = "Session not unlocked; redirect to the entry stage")
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    match state.flow.get_plan(&session) {
        StageOutcome::Proceed(plan) => Json(PlanResponse { plan }).into_response(),
        StageOutcome::Redirect(to) => redirect(to),
    }
}

//=========================================================================================
// Chat
//=========================================================================================

/// POST /ask-bot - Free chat with the assistant
#[utoipa::path(
    post,
    path = "/ask-bot",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The assistant's reply", body = ChatResponse),
        (status = 502, description = "The content service failed or timed out")
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, HandlerError> {
    let reply = state.flow.chat(&req.message).await.map_err(|e| {
        if e.is_content_failure() {
            (
                StatusCode::BAD_GATEWAY,
                "The assistant is unavailable right now.".to_string(),
            )
        } else {
            error!("Chat failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong. Please try again.".to_string(),
            )
        }
    })?;
    Ok(Json(ChatResponse { reply }))
}
