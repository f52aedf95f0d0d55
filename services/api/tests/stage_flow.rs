//! End-to-end checks of the stage routes against an in-memory SQLite code
//! store and a scripted content service.

use api_lib::{
    adapters::{DbAdapter, InMemorySessionStore},
    web::{self, cookie::SessionCookie, state::AppState},
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use study_gate_core::{
    codegen::CodeSpec,
    domain::Question,
    flow::{StudyFlow, PLAN_FALLBACK},
    ports::{AssessmentRequest, CodeStore, ContentService, PlanRequest, PortError, PortResult},
};
use tokio::sync::Notify;
use tower::ServiceExt;

//=========================================================================================
// Test Harness
//=========================================================================================

#[derive(Default)]
struct ScriptedContent {
    questions_fail: bool,
    plan_fail: bool,
    hold: Option<Arc<Hold>>,
}

/// Parks the next question request until released.
#[derive(Default)]
struct Hold {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ContentService for ScriptedContent {
    async fn generate_questions(&self, request: &AssessmentRequest) -> PortResult<Vec<Question>> {
        if self.questions_fail {
            return Err(PortError::ContentService("model unavailable".into()));
        }
        if let Some(hold) = &self.hold {
            if hold.armed.swap(false, Ordering::SeqCst) {
                hold.entered.notify_one();
                hold.release.notified().await;
            }
        }
        Ok((0..request.question_count.min(2))
            .map(|i| Question {
                prompt: format!("Question {i}"),
                choices: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct: "A".into(),
                subject: if i == 0 { "Math" } else { "Physics" }.into(),
            })
            .collect())
    }

    async fn generate_plan(&self, request: &PlanRequest) -> PortResult<String> {
        if self.plan_fail {
            return Err(PortError::ContentService("model unavailable".into()));
        }
        Ok(format!(
            "Plan for {} scoring {}/{}",
            request.student_name.as_deref().unwrap_or("student"),
            request.result.score,
            request.result.total
        ))
    }

    async fn chat(&self, message: &str) -> PortResult<String> {
        if self.plan_fail {
            return Err(PortError::ContentService("model unavailable".into()));
        }
        Ok(format!("echo: {message}"))
    }
}

struct TestApp {
    router: Router,
    codes: Vec<String>,
    sessions: Arc<InMemorySessionStore>,
}

async fn test_app(content: ScriptedContent) -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = DbAdapter::new(pool.clone(), CodeSpec { count: 5, length: 4 });
    db.run_migrations().await.unwrap();
    db.initialize().await.unwrap();
    let codes = sqlx::query_scalar::<_, String>("SELECT code FROM codes ORDER BY code")
        .fetch_all(&pool)
        .await
        .unwrap();

    let ttl = chrono::Duration::hours(1);
    let flow = StudyFlow::new(Arc::new(db), Arc::new(content)).with_question_count(2);
    let sessions = Arc::new(InMemorySessionStore::new(ttl));
    let state = Arc::new(AppState {
        flow,
        sessions: sessions.clone(),
        cookie: SessionCookie::new("integration-secret", false, ttl),
    });
    TestApp {
        router: web::router(state),
        codes,
        sessions,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    app.router
        .clone()
        .oneshot(request(method, uri, cookie, body))
        .await
        .unwrap()
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    }
}

/// The `name=value` pair from the response's `Set-Cookie` header.
fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response should set a cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

/// Redeems a code in a new session and returns that session's cookie.
async fn unlocked_session(app: &TestApp, code: &str) -> String {
    let response = send(app, Method::POST, "/", None, Some(json!({ "access_code": code }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    session_cookie(&response)
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn gated_routes_redirect_to_the_entry_page() {
    let app = test_app(ScriptedContent::default()).await;

    for uri in ["/register", "/schedule_info", "/exam", "/dashboard"] {
        let response = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/", "{uri}");
    }

    let response = send(
        &app,
        Method::POST,
        "/analyze_results",
        None,
        Some(json!({ "q0": "A" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn full_flow_from_code_to_plan() {
    let app = test_app(ScriptedContent::default()).await;
    let messy = format!("  {}  ", app.codes[0].to_lowercase());

    let response = send(&app, Method::POST, "/", None, Some(json!({ "access_code": messy }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], true);
    assert_eq!(body["next"], "/register");

    let response = send(
        &app,
        Method::POST,
        "/register",
        Some(&cookie),
        Some(json!({ "name": "Mona", "grade": "10", "stage": "secondary" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["next"], "/schedule_info");

    let response = send(&app, Method::GET, "/register", Some(&cookie), None).await;
    assert_eq!(json_body(response).await["fields"]["name"], "Mona");

    let response = send(
        &app,
        Method::POST,
        "/schedule_info",
        Some(&cookie),
        Some(json!({ "routine_Monday": "Football 5-7" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["next"], "/exam");

    let response = send(&app, Method::GET, "/exam", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let exam = json_body(response).await;
    assert_eq!(exam["questions"].as_array().unwrap().len(), 2);
    assert!(exam["questions"][0].get("correct").is_none());

    let response = send(
        &app,
        Method::POST,
        "/analyze_results",
        Some(&cookie),
        Some(json!({ "q0": "A", "q1": "B", "time_taken": "95" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let result = json_body(response).await;
    assert_eq!(result["score"], 1);
    assert_eq!(result["total"], 2);
    assert_eq!(result["rating"], "Needs effort 💪");
    assert_eq!(result["weaknesses"], json!(["Physics"]));
    assert_eq!(result["plan"], "Plan for Mona scoring 1/2");
    assert_eq!(result["degraded"], false);

    let response = send(&app, Method::GET, "/dashboard", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["plan"], "Plan for Mona scoring 1/2");

    let response = send(&app, Method::GET, "/session", Some(&cookie), None).await;
    let status = json_body(response).await;
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["stage"], "scored");
    assert_eq!(status["has_plan"], true);
}

#[tokio::test]
async fn a_code_unlocks_only_one_session() {
    let app = test_app(ScriptedContent::default()).await;
    let code = app.codes[1].clone();

    let first = unlocked_session(&app, &code).await;

    let response = send(&app, Method::POST, "/", None, Some(json!({ "access_code": code }))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], false);
    assert!(body["error"].is_string());

    // The unlocked session can resubmit without spending anything.
    let response = send(
        &app,
        Method::POST,
        "/",
        Some(&first),
        Some(json!({ "access_code": "ZZZZ" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_codes_are_refused() {
    let app = test_app(ScriptedContent::default()).await;
    let unknown = ["!!!!", "", "TOOLONG"];
    for code in unknown {
        let response = send(&app, Method::POST, "/", None, Some(json!({ "access_code": code }))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{code:?}");
    }
    assert_eq!(app.sessions.len().await, 0);

    unlocked_session(&app, &app.codes[0]).await;
    assert_eq!(app.sessions.len().await, 1);
}

#[tokio::test]
async fn failed_exam_generation_yields_no_questions() {
    let app = test_app(ScriptedContent {
        questions_fail: true,
        ..Default::default()
    })
    .await;
    let cookie = unlocked_session(&app, &app.codes[0]).await;

    let response = send(&app, Method::GET, "/exam", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["questions"], json!([]));

    // Nothing to score yet, so results send the student back to the exam.
    let response = send(
        &app,
        Method::POST,
        "/analyze_results",
        Some(&cookie),
        Some(json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/exam");
}

#[tokio::test]
async fn failed_plan_generation_keeps_the_score() {
    let app = test_app(ScriptedContent {
        plan_fail: true,
        ..Default::default()
    })
    .await;
    let cookie = unlocked_session(&app, &app.codes[0]).await;

    let response = send(&app, Method::GET, "/exam", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        Method::POST,
        "/analyze_results",
        Some(&cookie),
        Some(json!({ "q0": "A", "q1": "A" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let result = json_body(response).await;
    assert_eq!(result["score"], 2);
    assert_eq!(result["rating"], "Excellent 🌟");
    assert_eq!(result["plan"], PLAN_FALLBACK);
    assert_eq!(result["degraded"], true);

    let response = send(&app, Method::GET, "/dashboard", Some(&cookie), None).await;
    assert_eq!(json_body(response).await["plan"], "");

    let response = send(&app, Method::POST, "/ask-bot", None, Some(json!({ "message": "hi" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn chat_is_open_to_any_session() {
    let app = test_app(ScriptedContent::default()).await;
    let response = send(&app, Method::POST, "/ask-bot", None, Some(json!({ "message": "hello" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["reply"], "echo: hello");
}

#[tokio::test]
async fn tampered_cookies_start_a_fresh_session() {
    let app = test_app(ScriptedContent::default()).await;
    let cookie = unlocked_session(&app, &app.codes[2]).await;

    let mut tampered = cookie.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });

    let response = send(&app, Method::GET, "/session", Some(&tampered), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_ne!(session_cookie(&response), cookie);
    assert_eq!(json_body(response).await["authenticated"], false);

    let response = send(&app, Method::GET, "/session", Some(&cookie), None).await;
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(json_body(response).await["authenticated"], true);
}

#[tokio::test]
async fn ending_a_session_locks_it_again() {
    let app = test_app(ScriptedContent::default()).await;
    let cookie = unlocked_session(&app, &app.codes[3]).await;

    let response = send(&app, Method::DELETE, "/session", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(session_cookie(&response).starts_with("session="));

    let response = send(&app, Method::GET, "/register", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn a_slow_exam_does_not_undo_a_finished_result() {
    let hold = Arc::new(Hold::default());
    let app = test_app(ScriptedContent {
        hold: Some(hold.clone()),
        ..Default::default()
    })
    .await;
    let cookie = unlocked_session(&app, &app.codes[4]).await;
    let response = send(&app, Method::GET, "/exam", Some(&cookie), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    // A second exam request stalls in the content service with its own copy
    // of the session.
    hold.armed.store(true, Ordering::SeqCst);
    let slow_exam = tokio::spawn(
        app.router
            .clone()
            .oneshot(request(Method::GET, "/exam", Some(&cookie), None)),
    );
    hold.entered.notified().await;

    let response = send(
        &app,
        Method::POST,
        "/analyze_results",
        Some(&cookie),
        Some(json!({ "q0": "A", "q1": "A" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    hold.release.notify_one();
    let response = slow_exam.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, Method::GET, "/dashboard", Some(&cookie), None).await;
    assert_eq!(json_body(response).await["plan"], "Plan for student scoring 2/2");
    let response = send(&app, Method::GET, "/session", Some(&cookie), None).await;
    let status = json_body(response).await;
    assert_eq!(status["stage"], "scored");
    assert_eq!(status["question_count"], 2);
}
