//! Session record types
//!
//! Everything a finished session leaves behind: the validated session id,
//! the ordered dialogue segments with their candidate responses, free-form
//! dynamic adjustments, and the closing mood/summary. These shapes are
//! persisted verbatim in the session log document.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for session IDs
const MAX_SESSION_ID_LEN: usize = 128;

/// Process-wide counter making concurrently generated ids unique even
/// within one timestamp second
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Errors that can occur during session ID validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionIdError {
    #[error("Session ID cannot be empty")]
    Empty,

    #[error("Session ID contains invalid characters: allowed are a-z, A-Z, 0-9, _, -")]
    InvalidChars,

    #[error("Session ID exceeds maximum length of {MAX_SESSION_ID_LEN} characters")]
    TooLong,
}

/// A validated session ID
///
/// Generated ids are `session_<UTC timestamp>_<counter>`. Inbound ids (a
/// caller resuming a session) must be non-empty, alphanumeric with
/// underscores and hyphens, and at most 128 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a globally unique id from the current time and the
    /// process-wide counter.
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        SessionId(format!("session_{stamp}_{counter}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), SessionIdError> {
        if s.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong);
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SessionIdError::InvalidChars);
        }
        Ok(())
    }
}

impl TryFrom<&str> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(SessionId(value.to_string()))
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(SessionId(value))
    }
}

impl From<SessionId> for String {
    fn from(session_id: SessionId) -> Self {
        session_id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One generated response a patient or expert can pick between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResponse {
    pub response_id: String,
    pub text: String,
}

/// One logged unit of turn-level interaction within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueSegment {
    /// Monotonically increasing within a session, starting at 1
    pub segment_id: u64,
    /// Name of the flow/agent that produced this segment
    pub modality: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// The slice of conversation history produced since the previous
    /// segment
    pub transcript: String,
    #[serde(default)]
    pub candidate_responses: Vec<CandidateResponse>,
    /// Reference to the picked candidate's response_id, if any
    #[serde(default)]
    pub chosen_response: Option<String>,
}

/// Free-form note recording a mid-session fault or change of course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicAdjustment {
    pub at: DateTime<Utc>,
    pub note: String,
}

/// Caregiver-facing summary produced at session close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub overall_sentiment: String,
    pub notes: String,
    #[serde(default)]
    pub clinician_recommendation: String,
}

impl SessionSummary {
    /// Summary recorded when a session closes degraded, distinguishable in
    /// the log from a real analysis.
    pub fn interrupted(reason: &str) -> Self {
        Self {
            overall_sentiment: "unknown".to_string(),
            notes: format!("Session interrupted before analysis: {reason}"),
            clinician_recommendation: String::new(),
        }
    }
}

/// The durable record of one therapy session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub patient_id: String,
    pub start_time: DateTime<Utc>,
    /// Null until the session closes
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Descriptive mood keywords, deduplicated, order of first mention
    #[serde(default)]
    pub mood: Vec<String>,
    /// Append-only; never reordered or removed
    #[serde(default)]
    pub dialogue_segments: Vec<DialogueSegment>,
    #[serde(default)]
    pub dynamic_adjustments: Vec<DynamicAdjustment>,
    #[serde(default)]
    pub session_summary: Option<SessionSummary>,
}
