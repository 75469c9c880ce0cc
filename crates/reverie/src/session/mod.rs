//! Session orchestration: aggregation, logging, and the turn state machine

pub mod aggregator;
pub mod feedback;
pub mod log;
pub mod manager;
pub mod orchestrator;
pub mod types;

use thiserror::Error;

pub use aggregator::SessionAggregator;
pub use feedback::{FeedbackLog, FeedbackRecord, RankedResponse};
pub use log::SessionLog;
pub use manager::SessionManager;
pub use orchestrator::{Orchestrator, SessionOutcome, SessionState, Turn};
pub use types::{
    CandidateResponse, DialogueSegment, DynamicAdjustment, SessionId, SessionIdError,
    SessionRecord, SessionSummary,
};

/// Session lifecycle errors
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The session was closed twice; a programmer error
    #[error("Session is already closed")]
    AlreadyClosed,

    /// The flow could not continue. The session was still closed and
    /// logged with every segment collected so far.
    #[error("Flow interrupted for session {session_id}: {reason}")]
    FlowInterrupted { session_id: String, reason: String },
}
