//! The agent invocation boundary
//!
//! Everything language-model-shaped sits behind [`AgentInvoker`]: role
//! instructions plus a message history in, one reply text out. The
//! orchestrator never models prompt content as program logic; it only
//! inspects replies (classification labels, the completion sentinel, and
//! the structured analysis payloads parsed in [`analysis`]).

pub mod analysis;
pub mod flows;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use flows::Flow;
pub use remote::RemoteAgent;

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a running conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Render a history slice as plain text, one `role: content` line per
/// message. Used for segment transcripts and the analysis prompts.
pub fn render_history(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "patient",
                Role::Assistant => "facilitator",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Agent invocation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// The service could not be reached or did not answer in time
    #[error("Agent service unavailable: {0}")]
    Unavailable(String),

    /// The service answered, but the reply is unusable where structure was
    /// expected
    #[error("Malformed agent reply: {0}")]
    MalformedReply(String),

    /// A classification reply fell outside the closed set of flow names
    #[error("Ambiguous classification: {0:?}")]
    AmbiguousClassification(String),
}

/// The external capability that produces every reply in the system
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Submit role instructions and the running history; returns the reply
    /// text.
    async fn invoke(
        &self,
        role_instructions: &str,
        history: &[ChatMessage],
    ) -> Result<String, AgentError>;

    /// Implementation name for logging
    fn name(&self) -> &'static str;
}
