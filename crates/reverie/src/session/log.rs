//! Durable, append-only session log
//!
//! One JSON document `{"sessions": [...]}` holding every closed session
//! record. Appends are whole-file read-modify-write behind one async mutex
//! so concurrent session closures cannot lose each other's records, and the
//! replacement write is atomic.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, ReverieError};
use crate::session::types::SessionRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionLogDocument {
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

/// File-backed append-only log of closed sessions
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    append_guard: Mutex<()>,
}

impl SessionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Serialized across concurrent closures.
    pub async fn append(&self, record: &SessionRecord) -> Result<()> {
        let _guard = self.append_guard.lock().await;
        let mut doc = self.read_document()?;
        doc.sessions.push(record.clone());
        self.write_document(&doc)?;
        debug!(session_id = %record.session_id, total = doc.sessions.len(), "appended session record");
        Ok(())
    }

    /// Every logged record, oldest first
    pub fn read_all(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.read_document()?.sessions)
    }

    /// The most recent record (by start time) for a patient, if any
    pub fn recent_for_patient(&self, patient_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self
            .read_document()?
            .sessions
            .into_iter()
            .filter(|r| r.patient_id == patient_id)
            .max_by_key(|r| r.start_time))
    }

    fn read_document(&self) -> Result<SessionLogDocument> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(SessionLogDocument::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| ReverieError::CorruptStore(format!("malformed session log: {e}")))
    }

    fn write_document(&self, doc: &SessionLogDocument) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&tmp, doc)
            .map_err(|e| ReverieError::Serialization(e.to_string()))?;
        tmp.persist(&self.path).map_err(|e| ReverieError::Io(e.error))?;
        Ok(())
    }
}
