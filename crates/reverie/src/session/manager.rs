//! Registry of concurrently running sessions
//!
//! Each session is driven by a single logical flow of control: the caller
//! that started it feeds it inputs tagged with its session id. The manager
//! holds the suspended orchestrators between turns, hands each one out
//! exclusively while a turn runs, and drops it once the session reaches a
//! terminal state. Distinct sessions never observe each other's in-progress
//! segments; they only share the bank and the logs, which serialize their
//! own writes.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::agent::AgentInvoker;
use crate::bank::SharedBank;
use crate::config::SessionConfig;
use crate::error::{Result, ReverieError};
use crate::session::feedback::{FeedbackLog, FeedbackRecord};
use crate::session::log::SessionLog;
use crate::session::orchestrator::{Orchestrator, Turn};
use crate::session::types::{SessionId, SessionRecord};

/// Entry point for starting, resuming, and annotating sessions
pub struct SessionManager {
    bank: SharedBank,
    log: Arc<SessionLog>,
    feedback: Arc<FeedbackLog>,
    invoker: Arc<dyn AgentInvoker>,
    config: SessionConfig,
    active: DashMap<String, Orchestrator>,
}

impl SessionManager {
    pub fn new(
        bank: SharedBank,
        log: Arc<SessionLog>,
        feedback: Arc<FeedbackLog>,
        invoker: Arc<dyn AgentInvoker>,
        config: SessionConfig,
    ) -> Self {
        Self {
            bank,
            log,
            feedback,
            invoker,
            config,
            active: DashMap::new(),
        }
    }

    pub fn bank(&self) -> &SharedBank {
        &self.bank
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Start a new session for a patient with their opening prompt.
    ///
    /// Returns the generated session id with the first turn. If the flow
    /// already completed (or was interrupted), the session is not retained
    /// as active.
    pub async fn start_session(&self, patient_id: &str, prompt: &str) -> Result<(SessionId, Turn)> {
        let session_id = SessionId::generate();
        info!(%session_id, patient_id, "starting session");

        let mut orchestrator = Orchestrator::new(
            session_id.clone(),
            patient_id,
            self.bank.clone(),
            self.log.clone(),
            self.invoker.clone(),
            self.config.clone(),
        )
        .await?;

        let turn = orchestrator.open(prompt).await?;
        if orchestrator.is_in_flow() {
            self.active.insert(session_id.as_str().to_string(), orchestrator);
        }
        Ok((session_id, turn))
    }

    /// Resume a suspended session with the next patient input.
    ///
    /// The orchestrator is taken out of the registry for the duration of
    /// the turn; a resume for an id that is not suspended (unknown, already
    /// terminal, or mid-turn elsewhere) fails with `UnknownSession`.
    pub async fn resume(&self, session_id: &str, input: &str) -> Result<Turn> {
        let (key, mut orchestrator) = self
            .active
            .remove(session_id)
            .ok_or_else(|| ReverieError::UnknownSession(session_id.to_string()))?;

        let result = orchestrator.advance(input).await;
        if orchestrator.is_in_flow() {
            self.active.insert(key, orchestrator);
        }
        result
    }

    /// Close an active session without finishing its flow. The record is
    /// closed degraded and logged with every segment collected so far.
    pub async fn abandon(&self, session_id: &str, reason: &str) -> Result<SessionRecord> {
        let (_key, mut orchestrator) = self
            .active
            .remove(session_id)
            .ok_or_else(|| ReverieError::UnknownSession(session_id.to_string()))?;
        orchestrator.abort(reason).await
    }

    /// Persist a pilot feedback submission. The rank-1 pick is folded into
    /// the owning segment's `chosen_response` while the session is still
    /// active; the raw feedback is appended regardless.
    pub async fn record_feedback(&self, feedback: FeedbackRecord) -> Result<()> {
        if let Some(top) = feedback.top_choice() {
            if let Some(mut entry) = self.active.get_mut(&feedback.session_id) {
                entry.value_mut().apply_choice(&top.response_id);
            }
        }
        self.feedback.append(&feedback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{EntityStore, SharedBank};
    use crate::config::{BankConfig, RecallConfig};
    use crate::testing::MockAgent;
    use chrono::Utc;

    fn manager_with(agent: MockAgent, dir: &std::path::Path) -> SessionManager {
        let store = EntityStore::new(dir.join("memory_bank.json"));
        let bank =
            SharedBank::open(store, &BankConfig::default(), RecallConfig::default()).unwrap();
        SessionManager::new(
            bank,
            Arc::new(SessionLog::new(dir.join("session_log.json"))),
            Arc::new(FeedbackLog::new(dir.join("feedback.json"))),
            Arc::new(agent),
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_start_and_resume_by_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let agent = MockAgent::new()
            .reply("SRT")
            .reply("What was the name of your street?")
            .reply("That's right, Maple Street. Well done!")
            .reply("COMPLETE")
            .reply(r#"["calm"]"#)
            .reply(r#"{"overall_sentiment": "positive", "notes": "ok", "clinician_recommendation": ""}"#)
            .reply("{}");
        let manager = manager_with(agent, dir.path());

        let (session_id, turn) = manager
            .start_session("patient_1", "I keep forgetting my old address")
            .await
            .unwrap();
        assert!(matches!(turn, Turn::Reply { segment_id: 1, .. }));
        assert_eq!(manager.active_count(), 1);

        let turn = manager
            .resume(session_id.as_str(), "Maple Street, I think?")
            .await
            .unwrap();
        assert!(matches!(turn, Turn::Reply { segment_id: 2, .. }));

        let turn = manager.resume(session_id.as_str(), "Maple Street!").await.unwrap();
        assert!(matches!(turn, Turn::Completed(_)));
        assert_eq!(manager.active_count(), 0);

        // Terminal sessions cannot be resumed
        let result = manager.resume(session_id.as_str(), "hello?").await;
        assert!(matches!(result, Err(ReverieError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn test_abandoned_session_is_still_logged() {
        let dir = tempfile::tempdir().unwrap();
        let agent = MockAgent::new().reply("SRT").reply("Shall we talk about your street?");
        let manager = manager_with(agent, dir.path());

        let (session_id, _) = manager
            .start_session("patient_1", "I keep forgetting things")
            .await
            .unwrap();

        let record = manager
            .abandon(session_id.as_str(), "caller went away")
            .await
            .unwrap();
        assert!(record.end_time.is_some());
        assert_eq!(record.dialogue_segments.len(), 1);
        assert_eq!(manager.active_count(), 0);

        let logged = manager.session_log().read_all().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].session_id, session_id);
    }

    #[tokio::test]
    async fn test_resume_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(MockAgent::new(), dir.path());

        let result = manager.resume("session_nope", "hello").await;
        assert!(matches!(result, Err(ReverieError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn test_feedback_sets_chosen_response_on_active_session() {
        let dir = tempfile::tempdir().unwrap();
        let agent = MockAgent::new().reply("CST").reply("What did your garden grow?");
        let manager = manager_with(agent, dir.path());

        let (session_id, _) = manager
            .start_session("patient_1", "We had a lovely garden")
            .await
            .unwrap();

        manager
            .record_feedback(FeedbackRecord {
                session_id: session_id.as_str().to_string(),
                patient_id: "patient_1".to_string(),
                prompt: "We had a lovely garden".to_string(),
                responses: vec![crate::session::feedback::RankedResponse {
                    response_id: "res1".to_string(),
                    text: "What did your garden grow?".to_string(),
                    rank: Some(1),
                    comments: String::new(),
                }],
                submitted_at: Utc::now(),
            })
            .await
            .unwrap();

        let entry = manager.active.get(session_id.as_str()).unwrap();
        let record = entry.value().record_snapshot();
        assert_eq!(
            record.dialogue_segments[0].chosen_response.as_deref(),
            Some("res1")
        );
    }
}
