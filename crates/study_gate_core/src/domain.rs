//! crates/study_gate_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::fields::{Profile, Routine};
use crate::stage::Stage;

/// A single redeemable access code and its redemption status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCode {
    pub value: String,
    pub used: bool,
}

/// A multiple-choice question as produced by the content service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct: String,
    pub subject: String,
}

/// Qualitative band for an assessment, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rating {
    NeedsEffort,
    VeryGood,
    Excellent,
}

impl Rating {
    /// Human-facing label shown next to the score.
    pub fn label(self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent 🌟",
            Rating::VeryGood => "Very good 👍",
            Rating::NeedsEffort => "Needs effort 💪",
        }
    }
}

/// The outcome of scoring one set of answers. Derived, never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentResult {
    pub score: usize,
    pub total: usize,
    pub rating: Rating,
    pub weaknesses: BTreeSet<String>,
}

/// Per-user state carried through the stage sequence.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub authenticated: bool,
    pub stage: Stage,
    pub profile: Profile,
    pub routine: Routine,
    pub questions: Vec<Question>,
    pub result: Option<AssessmentResult>,
    pub plan: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    /// Creates an empty, unauthenticated session with a fresh identifier.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            authenticated: false,
            stage: Stage::Unauthenticated,
            profile: Profile::default(),
            routine: Routine::default(),
            questions: Vec::new(),
            result: None,
            plan: String::new(),
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Records that `stage` has been reached. The furthest stage never moves back.
    pub fn advance_to(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_locked() {
        let session = Session::new();
        assert!(!session.authenticated);
        assert_eq!(session.stage, Stage::Unauthenticated);
        assert!(session.questions.is_empty());
        assert!(session.plan.is_empty());
    }

    #[test]
    fn advance_is_monotonic() {
        let mut session = Session::new();
        session.advance_to(Stage::Assessed);
        session.advance_to(Stage::Registered);
        assert_eq!(session.stage, Stage::Assessed);
    }

    #[test]
    fn ratings_are_ordered() {
        assert!(Rating::NeedsEffort < Rating::VeryGood);
        assert!(Rating::VeryGood < Rating::Excellent);
    }
}
