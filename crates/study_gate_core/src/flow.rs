//! crates/study_gate_core/src/flow.rs
//!
//! The stage operations a student drives, from code redemption to the study plan.
//!
//! `StudyFlow` owns no session state. Each operation receives the caller's
//! `Session` explicitly, mutates it, and leaves persisting it to the caller.

use chrono::{Datelike, Local, Weekday};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{AssessmentResult, Question, Session};
use crate::fields::{AnswerSheet, FieldMap, Profile, Routine};
use crate::ports::{
    AssessmentRequest, CodeStore, ContentService, PlanRequest, PortError, PortResult,
};
use crate::scoring;
use crate::stage::{self, GateDecision, Stage, StageOutcome};

/// Returned in place of a plan when the content service cannot produce one.
pub const PLAN_FALLBACK: &str =
    "We couldn't prepare your study plan right now. Please try again in a few minutes.";

pub const DEFAULT_QUESTION_COUNT: usize = 10;
pub const DEFAULT_CONTENT_TIMEOUT: Duration = Duration::from_secs(30);

/// The answer to a submitted access code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    Accepted,
    /// The code is unknown or already used. The student may try again.
    Rejected,
}

/// A scored assessment together with the plan built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPlan {
    pub result: AssessmentResult,
    pub plan: String,
    /// True when `plan` is the fallback text rather than generated content.
    pub degraded: bool,
}

/// A snapshot of where a session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub stage: Stage,
    pub question_count: usize,
    pub has_plan: bool,
}

#[derive(Clone)]
pub struct StudyFlow {
    codes: Arc<dyn CodeStore>,
    content: Arc<dyn ContentService>,
    question_count: usize,
    content_timeout: Duration,
}

impl StudyFlow {
    pub fn new(codes: Arc<dyn CodeStore>, content: Arc<dyn ContentService>) -> Self {
        Self {
            codes,
            content,
            question_count: DEFAULT_QUESTION_COUNT,
            content_timeout: DEFAULT_CONTENT_TIMEOUT,
        }
    }

    pub fn with_question_count(mut self, question_count: usize) -> Self {
        self.question_count = question_count;
        self
    }

    pub fn with_content_timeout(mut self, content_timeout: Duration) -> Self {
        self.content_timeout = content_timeout;
        self
    }

    pub fn codes(&self) -> &Arc<dyn CodeStore> {
        &self.codes
    }

    //=====================================================================================
    // Entry
    //=====================================================================================

    /// Redeems `code` and unlocks the session on success.
    ///
    /// A session that is already unlocked is accepted without spending another
    /// code. Storage failures are returned as errors, never as a rejection.
    pub async fn submit_code(&self, session: &mut Session, code: &str) -> PortResult<Redemption> {
        if session.authenticated {
            debug!(session_id = %session.id, "Session already unlocked; code not consumed");
            return Ok(Redemption::Accepted);
        }

        if self.codes.redeem(code).await? {
            session.authenticated = true;
            info!(session_id = %session.id, "Access code redeemed");
            Ok(Redemption::Accepted)
        } else {
            info!(session_id = %session.id, "Access code rejected");
            Ok(Redemption::Rejected)
        }
    }

    pub fn status(&self, session: &Session) -> SessionStatus {
        SessionStatus {
            authenticated: session.authenticated,
            stage: session.stage,
            question_count: session.questions.len(),
            has_plan: !session.plan.is_empty(),
        }
    }

    //=====================================================================================
    // Registration and Schedule
    //=====================================================================================

    pub fn registration(&self, session: &Session) -> StageOutcome<Profile> {
        gated(session, Stage::Registered, || session.profile.clone())
    }

    /// Stores the registration fields, replacing any earlier submission.
    pub fn submit_registration(&self, session: &mut Session, fields: FieldMap) -> StageOutcome<()> {
        if let GateDecision::Redirect(to) = stage::check(session, Stage::Registered) {
            return StageOutcome::Redirect(to);
        }
        session.profile = Profile::new(fields);
        session.advance_to(Stage::Registered);
        StageOutcome::Proceed(())
    }

    pub fn schedule(&self, session: &Session) -> StageOutcome<Routine> {
        gated(session, Stage::ScheduleCaptured, || session.routine.clone())
    }

    /// Stores the weekly routine, replacing any earlier submission.
    pub fn submit_schedule(&self, session: &mut Session, fields: FieldMap) -> StageOutcome<()> {
        if let GateDecision::Redirect(to) = stage::check(session, Stage::ScheduleCaptured) {
            return StageOutcome::Redirect(to);
        }
        session.routine = Routine::new(fields);
        session.advance_to(Stage::ScheduleCaptured);
        StageOutcome::Proceed(())
    }

    //=====================================================================================
    // Assessment
    //=====================================================================================

    /// Generates a fresh question set for the student.
    ///
    /// If the content service fails or times out the session gets an empty
    /// question set; the failure is logged and not returned.
    pub async fn start_assessment(&self, session: &mut Session) -> StageOutcome<Vec<Question>> {
        if let GateDecision::Redirect(to) = stage::check(session, Stage::Assessed) {
            return StageOutcome::Redirect(to);
        }

        let request = AssessmentRequest {
            grade: session.profile.grade().map(str::to_string),
            stage: session.profile.stage().map(str::to_string),
            question_count: self.question_count,
        };

        session.questions = match self.bounded(self.content.generate_questions(&request)).await {
            Ok(questions) => {
                info!(session_id = %session.id, count = questions.len(), "Assessment generated");
                questions
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Assessment generation failed; continuing with no questions");
                Vec::new()
            }
        };
        session.advance_to(Stage::Assessed);
        StageOutcome::Proceed(session.questions.clone())
    }

    /// Scores the submitted answers and asks for a plan built on today's routine.
    pub async fn submit_answers(
        &self,
        session: &mut Session,
        fields: &FieldMap,
    ) -> StageOutcome<ScoredPlan> {
        self.submit_answers_on(session, fields, Local::now().weekday())
            .await
    }

    /// Same as `submit_answers`, with the routine looked up for `today`.
    pub async fn submit_answers_on(
        &self,
        session: &mut Session,
        fields: &FieldMap,
        today: Weekday,
    ) -> StageOutcome<ScoredPlan> {
        if let GateDecision::Redirect(to) = stage::check(session, Stage::Scored) {
            return StageOutcome::Redirect(to);
        }

        let sheet = AnswerSheet::from_fields(fields, session.questions.len());
        let result = scoring::score(&session.questions, &sheet.answers);
        info!(
            session_id = %session.id,
            score = result.score,
            total = result.total,
            rating = ?result.rating,
            "Assessment scored"
        );
        session.result = Some(result.clone());
        session.advance_to(Stage::Scored);

        let request = PlanRequest {
            student_name: session.profile.name().map(str::to_string),
            grade: session.profile.grade().map(str::to_string),
            result: result.clone(),
            elapsed_seconds: sheet.elapsed_seconds,
            today_routine: session.routine.entry_for(today).map(str::to_string),
        };

        match self.bounded(self.content.generate_plan(&request)).await {
            Ok(plan) => {
                session.plan = plan.clone();
                StageOutcome::Proceed(ScoredPlan {
                    result,
                    plan,
                    degraded: false,
                })
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Plan generation failed; returning fallback text");
                StageOutcome::Proceed(ScoredPlan {
                    result,
                    plan: PLAN_FALLBACK.to_string(),
                    degraded: true,
                })
            }
        }
    }

    /// The dashboard only needs an unlocked session. An empty plan means none
    /// has been generated yet.
    pub fn get_plan(&self, session: &Session) -> StageOutcome<String> {
        gated(session, Stage::Registered, || session.plan.clone())
    }

    //=====================================================================================
    // Chat
    //=====================================================================================

    /// Passes `message` straight to the content service. Not gated.
    pub async fn chat(&self, message: &str) -> PortResult<String> {
        self.bounded(self.content.chat(message))
            .await
            .inspect_err(|e| warn!(error = %e, "Chat request failed"))
    }

    async fn bounded<T, F>(&self, call: F) -> PortResult<T>
    where
        F: Future<Output = PortResult<T>>,
    {
        match tokio::time::timeout(self.content_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Timeout(self.content_timeout.as_secs())),
        }
    }
}

fn gated<T>(session: &Session, target: Stage, view: impl FnOnce() -> T) -> StageOutcome<T> {
    match stage::check(session, target) {
        GateDecision::Proceed => StageOutcome::Proceed(view()),
        GateDecision::Redirect(to) => StageOutcome::Redirect(to),
    }
}
