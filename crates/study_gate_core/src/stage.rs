//! crates/study_gate_core/src/stage.rs
//!
//! The linear stage machine and the gate that guards entry to each stage.

use crate::domain::Session;

/// The stages a student moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Unauthenticated,
    Registered,
    ScheduleCaptured,
    Assessed,
    Scored,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Unauthenticated => "unauthenticated",
            Stage::Registered => "registered",
            Stage::ScheduleCaptured => "schedule_captured",
            Stage::Assessed => "assessed",
            Stage::Scored => "scored",
        }
    }
}

/// What a caller should do when asking to enter a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Redirect(Stage),
}

/// The result of a gated operation: either its value, or the stage the
/// student must be sent to instead.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Proceed(T),
    Redirect(Stage),
}

/// Decides whether `session` may enter `target`.
///
/// Every stage past the entry stage needs a redeemed code. `Scored` also needs
/// a question set to score against; without one the student goes back to the
/// assessment. Re-entering a stage already reached is always allowed.
pub fn check(session: &Session, target: Stage) -> GateDecision {
    if target == Stage::Unauthenticated {
        return GateDecision::Proceed;
    }
    if !session.authenticated {
        return GateDecision::Redirect(Stage::Unauthenticated);
    }
    if target == Stage::Scored && session.questions.is_empty() {
        return GateDecision::Redirect(Stage::Assessed);
    }
    GateDecision::Proceed
}
