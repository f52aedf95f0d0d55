//! crates/study_gate_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AssessmentResult, Question, Session};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// Storage and capacity failures are fatal for the operation that hit them.
/// Content-service failures and timeouts are degraded from by the flow layer.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("Cannot generate {requested} unique codes: only {capacity} exist at this length")]
    CapacityExhausted { requested: u64, capacity: u64 },
    #[error("Content service failure: {0}")]
    ContentService(String),
    #[error("Content service did not respond within {0} seconds")]
    Timeout(u64),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// True for failures of the external content service.
    pub fn is_content_failure(&self) -> bool {
        matches!(self, PortError::ContentService(_) | PortError::Timeout(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// An in-place edit of a stored session.
pub type SessionChange = Box<dyn FnOnce(&mut Session) + Send>;

//=========================================================================================
// Port Payloads
//=========================================================================================

/// What happened when the code store was initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The store was empty and a new pool of this many codes was written.
    Generated(usize),
    /// The store already held codes; nothing was written.
    AlreadySeeded,
}

/// Operator-facing counters for the code pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeStats {
    pub total: u64,
    pub used: u64,
}

/// Inputs for generating an assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentRequest {
    pub grade: Option<String>,
    pub stage: Option<String>,
    pub question_count: usize,
}

/// Inputs for generating a personalized study plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub student_name: Option<String>,
    pub grade: Option<String>,
    pub result: AssessmentResult,
    pub elapsed_seconds: u64,
    pub today_routine: Option<String>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Seeds the store with a generated pool if, and only if, it is empty.
    /// Safe to call concurrently; at most one caller generates.
    async fn initialize(&self) -> PortResult<SeedOutcome>;

    /// Marks `code` as used if it exists and is unused. Input is trimmed and
    /// upper-cased first. Returns `false` for unknown or already-used codes.
    async fn redeem(&self, code: &str) -> PortResult<bool>;

    async fn stats(&self) -> PortResult<CodeStats>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the live session with this id, or `None` if it is unknown or expired.
    async fn load(&self, session_id: Uuid) -> PortResult<Option<Session>>;

    async fn save(&self, session: Session) -> PortResult<()>;

    /// Applies `change` to the live stored session in one step, leaving fields
    /// it does not touch as the latest writer left them. Returns `false` if the
    /// session is unknown or expired.
    async fn update(&self, session_id: Uuid, change: SessionChange) -> PortResult<bool>;

    async fn remove(&self, session_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait ContentService: Send + Sync {
    /// Generates a multiple-choice question set for the student's level.
    async fn generate_questions(&self, request: &AssessmentRequest) -> PortResult<Vec<Question>>;

    /// Generates a formatted study plan from a scored assessment.
    async fn generate_plan(&self, request: &PlanRequest) -> PortResult<String>;

    /// Free-form chat passthrough.
    async fn chat(&self, message: &str) -> PortResult<String>;
}
