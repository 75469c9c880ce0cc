//! Post-session analyses: mood, caregiver summary, memory extraction
//!
//! Each analysis is one agent invocation over the full session history with
//! a strict JSON output contract. The parsers here are the only place those
//! payloads are interpreted; anything that does not parse is a
//! `MalformedReply` and the orchestrator degrades gracefully.

use crate::agent::AgentError;
use crate::merge::MemoryFragment;
use crate::session::types::SessionSummary;

/// Mood analysis over the session transcript. Output: JSON array of
/// lowercase descriptive keywords.
pub const MOOD_INSTRUCTIONS: &str = r#"You analyze the emotional state of a memory-therapy participant from a session transcript.

Read the conversation and describe the participant's mood over the session as short descriptive keywords (for example: "calm", "nostalgic", "frustrated", "engaged").

Respond with ONLY a JSON array of lowercase keyword strings, no other text:
["calm", "nostalgic"]"#;

/// Caregiver-facing summary of the session. Output: one JSON object.
pub const SUMMARY_INSTRUCTIONS: &str = r#"You review a completed memory-therapy session and write a summary for the participant's caregiver and clinician.

Respond with ONLY a JSON object in this exact shape, no other text:
{
  "overall_sentiment": "one word such as positive, neutral, or strained",
  "notes": "two or three sentences on how the session went and what the participant engaged with",
  "clinician_recommendation": "one sentence suggesting a focus for the next session"
}"#;

/// Memory extraction over the session transcript. Output: a partial memory
/// bank document.
pub const EXTRACTION_INSTRUCTIONS: &str = r#"You extract structured memories from a memory-therapy session transcript.

Identify people, events, and locations the participant recalled, and the relationships between them. Reuse ids the transcript mentions; give new entities short unique ids ("p7", "e3", "l2"). Rate each recall_strength and connection strength from 0.0 to 1.0 by how clearly and warmly the participant recalled it.

Respond with ONLY a JSON object in this exact shape (omit empty sections), no other text:
{
  "people": [{"id": "p4", "name": "Emily", "relationship": "Cousin", "recall_strength": 0.9}],
  "events": [{"id": "e5", "description": "Trip to Japan", "tags": ["travel"], "recall_strength": 0.9}],
  "locations": [{"id": "l7", "name": "Tokyo, Japan", "description": "Capital city of Japan"}],
  "connections": [{"source": "p4", "target": "e5", "strength": 0.9}]
}"#;

/// Parse the mood analysis reply: a JSON array of keyword strings,
/// deduplicated, order preserved, normalized to lowercase.
pub fn parse_mood(reply: &str) -> Result<Vec<String>, AgentError> {
    let keywords: Vec<String> = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| AgentError::MalformedReply(format!("mood payload: {e}")))?;

    let mut seen = std::collections::HashSet::new();
    Ok(keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect())
}

/// Parse the caregiver summary reply into a [`SessionSummary`]
pub fn parse_summary(reply: &str) -> Result<SessionSummary, AgentError> {
    serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| AgentError::MalformedReply(format!("summary payload: {e}")))
}

/// Parse the extraction reply into a [`MemoryFragment`]
pub fn parse_fragment(reply: &str) -> Result<MemoryFragment, AgentError> {
    serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| AgentError::MalformedReply(format!("fragment payload: {e}")))
}

/// Models often wrap JSON in a markdown fence despite instructions; accept
/// both bare and fenced payloads.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
