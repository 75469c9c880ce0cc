//! Pilot feedback capture
//!
//! Experts rank the candidate responses a session produced; the raw
//! feedback is appended to its own `{"feedbacks": [...]}` document and the
//! rank-1 pick is folded back into the owning segment's `chosen_response`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, ReverieError};

/// One ranked candidate response in a feedback submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResponse {
    pub response_id: String,
    pub text: String,
    /// 1 is the preferred response
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub comments: String,
}

/// A full feedback submission for one session prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub session_id: String,
    pub patient_id: String,
    pub prompt: String,
    pub responses: Vec<RankedResponse>,
    pub submitted_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// The rank-1 response, if one was marked
    pub fn top_choice(&self) -> Option<&RankedResponse> {
        self.responses.iter().find(|r| r.rank == Some(1))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedbackDocument {
    #[serde(default)]
    feedbacks: Vec<FeedbackRecord>,
}

/// File-backed append-only feedback log
#[derive(Debug)]
pub struct FeedbackLog {
    path: PathBuf,
    append_guard: Mutex<()>,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_guard: Mutex::new(()),
        }
    }

    pub async fn append(&self, record: &FeedbackRecord) -> Result<()> {
        let _guard = self.append_guard.lock().await;
        let mut doc = self.read_document()?;
        doc.feedbacks.push(record.clone());

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&tmp, &doc)
            .map_err(|e| ReverieError::Serialization(e.to_string()))?;
        tmp.persist(&self.path).map_err(|e| ReverieError::Io(e.error))?;

        debug!(session_id = %record.session_id, "appended feedback record");
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<FeedbackRecord>> {
        Ok(self.read_document()?.feedbacks)
    }

    fn read_document(&self) -> Result<FeedbackDocument> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FeedbackDocument::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| ReverieError::CorruptStore(format!("malformed feedback log: {e}")))
    }
}
