//! Test utilities - a scripted agent for exercising the orchestrator
//!
//! The mock plays back a queue of replies (or faults) in order, so tests
//! can walk a session through classification, turns, the completion
//! sentinel, and the post-session analyses without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::{AgentError, AgentInvoker, ChatMessage};

/// Scripted [`AgentInvoker`] for tests
#[derive(Debug, Default)]
pub struct MockAgent {
    script: Mutex<VecDeque<Result<String, AgentError>>>,
    histories: Mutex<Vec<Vec<ChatMessage>>>,
    calls: AtomicUsize,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn reply(self, text: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
        self
    }

    /// Queue an unreachable-service fault
    pub fn fail_unavailable(self, reason: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(AgentError::Unavailable(reason.to_string())));
        self
    }

    /// How many invocations the mock has served
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The history passed to the nth invocation
    pub fn history_at(&self, call: usize) -> Option<Vec<ChatMessage>> {
        self.histories.lock().unwrap().get(call).cloned()
    }
}

#[async_trait]
impl AgentInvoker for MockAgent {
    async fn invoke(
        &self,
        _role_instructions: &str,
        history: &[ChatMessage],
    ) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().unwrap().push(history.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Unavailable("mock script exhausted".to_string())))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_plays_back_in_order() {
        let agent = MockAgent::new().reply("first").reply("second");

        assert_eq!(agent.invoke("x", &[]).await.unwrap(), "first");
        assert_eq!(agent.invoke("x", &[]).await.unwrap(), "second");
        assert_eq!(agent.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_faults_and_exhaustion() {
        let agent = MockAgent::new().fail_unavailable("down for maintenance");

        let err = agent.invoke("x", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Unavailable(_)));

        // An exhausted script reads as an unreachable service
        let err = agent.invoke("x", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Unavailable(_)));
    }
}
