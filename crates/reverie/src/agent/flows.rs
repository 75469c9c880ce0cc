//! Therapy flows and their instruction sets
//!
//! A flow is a named conversation mode selected once per session by the
//! classifier. The instruction constants are the role text handed to the
//! agent invocation service verbatim; the code only cares about the flow
//! names, the completion sentinel, and the fallback.

use serde::{Deserialize, Serialize};

use crate::agent::AgentError;

/// Reserved literal reply that ends a flow. Never surfaced as conversation.
pub const COMPLETION_SENTINEL: &str = "COMPLETE";

/// Shown to the patient when a turn cannot be produced; the technical error
/// stays out of the conversation.
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I lost my train of thought for a moment. Let's take a short \
     break and pick this up again soon.";

/// Instructions for the steering classifier. The reply must be exactly one
/// of the flow labels.
pub const CLASSIFIER_INSTRUCTIONS: &str = r#"You are an expert in memory therapy and understand when to apply spaced retrieval therapy (SRT) or cognitive stimulation therapy (CST).

Classify the patient's opening statement:
- Choose SRT when the patient would benefit from structured practice recalling a specific personal target.
- Choose CST when the patient would benefit from open, themed conversation and gentle cognitive engagement.

Output Format:
Respond with exactly "SRT" or "CST", nothing else."#;

const SRT_INSTRUCTIONS: &str = r#"Role:
You are an expert in Spaced Retrieval Therapy (SRT) conducting a personalized, one-on-one reminiscence and memory training session for an individual with early-stage memory loss. Your goal is to help the participant reliably recall essential personal information, routines, or specific tasks through structured repetition at progressively longer intervals.

Responsibilities:
- Select a clear, personally meaningful recall target.
- State the target plainly at first and prompt immediate repetition.
- Prompt recall again at progressively longer intervals, using errorless learning.
- Fill the intervals with relaxed, positive conversation.
- On an incorrect response, state the correct answer plainly and warmly.
- Stay positive, empathetic, and reassuring throughout.

Output Format:
- Respond clearly and conversationally.
- When the practice has succeeded, respond with ONLY "COMPLETE"."#;

const CST_INSTRUCTIONS: &str = r#"Role:
You facilitate a personalized, one-on-one Cognitive Stimulation Therapy (CST) session for an individual with early-stage memory loss, fostering meaningful conversation and cognitive engagement.

Responsibilities:
- Provide gentle orientation cues.
- Introduce one clear theme at a time.
- Engage the participant with personalized questions.
- Offer gentle cues when the participant struggles.
- Adapt to signs of frustration or fatigue.

Output Format:
- Respond only with relevant conversational questions or statements.
- Upon a natural end point or signs of fatigue, respond with ONLY "COMPLETE"."#;

/// A therapeutic conversation mode, selected once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    SpacedRetrieval,
    CognitiveStimulation,
}

impl Flow {
    /// Flow used when classification cannot produce a usable label
    pub const FALLBACK: Flow = Flow::SpacedRetrieval;

    /// Modality name recorded on dialogue segments
    pub fn modality(&self) -> &'static str {
        match self {
            Flow::SpacedRetrieval => "srt",
            Flow::CognitiveStimulation => "cst",
        }
    }

    /// Role instructions for this flow's agent
    pub fn instructions(&self) -> &'static str {
        match self {
            Flow::SpacedRetrieval => SRT_INSTRUCTIONS,
            Flow::CognitiveStimulation => CST_INSTRUCTIONS,
        }
    }

    /// Map the classifier's reply text onto the closed set of flows.
    ///
    /// The comparison runs against the extracted, trimmed reply text, not
    /// against any reply object. Anything outside the set is ambiguous and
    /// handled by the caller's retry/fallback policy.
    pub fn from_classifier_reply(reply: &str) -> Result<Flow, AgentError> {
        match reply.trim().to_ascii_uppercase().as_str() {
            "SRT" => Ok(Flow::SpacedRetrieval),
            "CST" => Ok(Flow::CognitiveStimulation),
            _ => Err(AgentError::AmbiguousClassification(reply.to_string())),
        }
    }

    /// Whether a reply is the completion sentinel rather than conversation
    pub fn is_completion(reply: &str) -> bool {
        reply.trim() == COMPLETION_SENTINEL
    }
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.modality())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_reply_matches_extracted_text() {
        assert_eq!(
            Flow::from_classifier_reply("SRT").unwrap(),
            Flow::SpacedRetrieval
        );
        // Whitespace and case come from a language model; both are tolerated
        assert_eq!(
            Flow::from_classifier_reply("  cst \n").unwrap(),
            Flow::CognitiveStimulation
        );
    }

    #[test]
    fn test_off_set_reply_is_ambiguous() {
        let result = Flow::from_classifier_reply("I think SRT would be best here.");
        assert!(matches!(
            result,
            Err(AgentError::AmbiguousClassification(_))
        ));
    }

    #[test]
    fn test_completion_sentinel_detection() {
        assert!(Flow::is_completion("COMPLETE"));
        assert!(Flow::is_completion("  COMPLETE\n"));
        assert!(!Flow::is_completion("The session is complete."));
        assert!(!Flow::is_completion("complete"));
    }

    #[test]
    fn test_fallback_flow() {
        assert_eq!(Flow::FALLBACK, Flow::SpacedRetrieval);
    }
}
