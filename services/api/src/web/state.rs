//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::web::cookie::SessionCookie;
use std::sync::Arc;
use study_gate_core::{flow::StudyFlow, ports::SessionStore};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub flow: StudyFlow,
    pub sessions: Arc<dyn SessionStore>,
    pub cookie: SessionCookie,
}
