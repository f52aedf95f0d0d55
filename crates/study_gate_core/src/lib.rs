pub mod codegen;
pub mod domain;
pub mod fields;
pub mod flow;
pub mod ports;
pub mod scoring;
pub mod stage;

pub use codegen::{CodeGenerator, CodePool, CodeSpec};
pub use domain::{AccessCode, AssessmentResult, Question, Rating, Session};
pub use fields::{AnswerSheet, FieldMap, Profile, Routine};
pub use flow::{Redemption, ScoredPlan, SessionStatus, StudyFlow, PLAN_FALLBACK};
pub use ports::{
    AssessmentRequest, CodeStats, CodeStore, ContentService, PlanRequest, PortError, PortResult,
    SeedOutcome, SessionChange, SessionStore,
};
pub use stage::{GateDecision, Stage, StageOutcome};
