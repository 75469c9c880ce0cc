//! The session state machine
//!
//! Drives one therapy session through
//! `Init -> Classifying -> InFlow -> Complete -> PostProcessing -> Logged`.
//! The orchestrator owns the session's aggregator and history; between
//! turns it returns control to its caller and resumes when the next inbound
//! message for the session arrives. Agent invocations are awaited without
//! holding any bank or log lock.
//!
//! Failure policy: every agent fault gets one retry and a dynamic
//! adjustment entry. A second classification or turn fault closes the
//! session degraded, logs whatever was collected, and surfaces
//! `FlowInterrupted`. Post-session analysis faults degrade individual
//! fields but never lose the record.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::agent::analysis::{
    parse_fragment, parse_mood, parse_summary, EXTRACTION_INSTRUCTIONS, MOOD_INSTRUCTIONS,
    SUMMARY_INSTRUCTIONS,
};
use crate::agent::flows::{Flow, CLASSIFIER_INSTRUCTIONS};
use crate::agent::{render_history, AgentError, AgentInvoker, ChatMessage};
use crate::bank::SharedBank;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::merge::{MemoryFragment, MergeReport};
use crate::session::aggregator::SessionAggregator;
use crate::session::log::SessionLog;
use crate::session::types::{
    CandidateResponse, DialogueSegment, SessionId, SessionRecord, SessionSummary,
};
use crate::session::SessionError;

/// Where a session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Classifying,
    InFlow(Flow),
    Complete,
    PostProcessing,
    Logged,
}

/// What one driven step of the session produced
#[derive(Debug, Clone)]
pub enum Turn {
    /// A conversational continuation; the caller should collect the next
    /// patient input and call `advance` again.
    Reply {
        segment_id: u64,
        text: String,
        candidates: Vec<CandidateResponse>,
    },
    /// The flow finished and the session is closed and logged.
    Completed(Box<SessionOutcome>),
}

/// Terminal result of a session
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub record: SessionRecord,
    pub merge_report: MergeReport,
}

/// Drives a single session from first prompt to logged record
pub struct Orchestrator {
    state: SessionState,
    aggregator: SessionAggregator,
    history: Vec<ChatMessage>,
    /// Index of the first history entry not yet captured in a segment
    cursor: usize,
    /// Entities surfaced at session start; decayed if the session never
    /// comes back to them
    surfaced_ids: Vec<String>,
    bank: SharedBank,
    log: Arc<SessionLog>,
    invoker: Arc<dyn AgentInvoker>,
    config: SessionConfig,
}

impl Orchestrator {
    /// Construct a session in `Init`: build the aggregator and seed the
    /// conversation context from the patient's most recent prior session
    /// and the currently most salient memories.
    pub async fn new(
        session_id: SessionId,
        patient_id: &str,
        bank: SharedBank,
        log: Arc<SessionLog>,
        invoker: Arc<dyn AgentInvoker>,
        config: SessionConfig,
    ) -> Result<Self> {
        let aggregator = SessionAggregator::start(session_id, patient_id);
        let mut history = Vec::new();

        if config.seed_prior_session {
            if let Some(prior) = log.recent_for_patient(patient_id)? {
                history.push(ChatMessage::system(prior_session_context(&prior)));
            }
        }

        let surface_count = bank.engine().config().surface_count;
        let salient = bank.top_by_recall(surface_count).await;
        if !salient.is_empty() {
            let names: Vec<&str> = salient.iter().map(|e| e.display_text()).collect();
            history.push(ChatMessage::system(format!(
                "Memories currently strongest for this participant: {}. \
                 Weave them in gently when relevant.",
                names.join("; ")
            )));
        }
        let surfaced_ids = salient.iter().map(|e| e.id().to_string()).collect();

        Ok(Self {
            state: SessionState::Init,
            aggregator,
            history,
            cursor: 0,
            surfaced_ids,
            bank,
            log,
            invoker,
            config,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &SessionId {
        self.aggregator.session_id()
    }

    pub fn is_in_flow(&self) -> bool {
        matches!(self.state, SessionState::InFlow(_))
    }

    /// Snapshot of the record as collected so far
    pub fn record_snapshot(&self) -> SessionRecord {
        self.aggregator.to_record()
    }

    /// Mark a candidate as the chosen response on the segment that offered
    /// it. Returns false if no segment knows the id.
    pub fn apply_choice(&mut self, response_id: &str) -> bool {
        self.aggregator.choose_response(response_id)
    }

    /// Run the opening prompt: classify, enter the selected flow, and
    /// produce the first turn.
    pub async fn open(&mut self, prompt: &str) -> Result<Turn> {
        debug_assert_eq!(self.state, SessionState::Init);
        self.history.push(ChatMessage::user(prompt));

        self.state = SessionState::Classifying;
        let flow = match self.classify().await {
            Ok(flow) => flow,
            Err(e) => return self.interrupt(&format!("classification failed: {e}")).await,
        };
        info!(session_id = %self.session_id(), %flow, "flow selected");
        self.state = SessionState::InFlow(flow);

        self.step().await
    }

    /// Feed the next patient input into the running flow
    pub async fn advance(&mut self, input: &str) -> Result<Turn> {
        debug_assert!(self.is_in_flow());
        self.history.push(ChatMessage::user(input));
        self.step().await
    }

    /// Classification with one retry. Ambiguous or malformed replies fall
    /// back to the designated flow; a second unreachable-service fault
    /// bubbles up for a degraded close.
    async fn classify(&mut self) -> std::result::Result<Flow, AgentError> {
        for attempt in 0..2u8 {
            let retrying = attempt == 0;
            match self
                .invoker
                .invoke(CLASSIFIER_INSTRUCTIONS, &self.history)
                .await
            {
                Ok(reply) => match Flow::from_classifier_reply(&reply) {
                    Ok(flow) => return Ok(flow),
                    Err(e) if retrying => {
                        self.aggregator
                            .record_adjustment(format!("classification ambiguous, retrying: {e}"));
                    }
                    Err(_) => {
                        self.aggregator.record_adjustment(format!(
                            "classification unusable after retry, defaulting to {} flow",
                            Flow::FALLBACK
                        ));
                        return Ok(Flow::FALLBACK);
                    }
                },
                Err(e @ AgentError::Unavailable(_)) => {
                    if retrying {
                        self.aggregator.record_adjustment(format!(
                            "transient agent fault during classification, retrying: {e}"
                        ));
                    } else {
                        return Err(e);
                    }
                }
                Err(e) if retrying => {
                    self.aggregator
                        .record_adjustment(format!("unusable classification reply, retrying: {e}"));
                }
                Err(_) => {
                    self.aggregator.record_adjustment(format!(
                        "classification unusable after retry, defaulting to {} flow",
                        Flow::FALLBACK
                    ));
                    return Ok(Flow::FALLBACK);
                }
            }
        }
        unreachable!("classification loop always returns within two attempts")
    }

    /// One flow invocation: build the segment, detect the completion
    /// sentinel, and either continue or run post-processing.
    async fn step(&mut self) -> Result<Turn> {
        let SessionState::InFlow(flow) = self.state else {
            unreachable!("step is only reachable in InFlow");
        };

        let started = Utc::now();
        let transcript = render_history(&self.history[self.cursor..]);

        let candidates = match self.generate_candidates(flow).await {
            Ok(candidates) => candidates,
            Err(e) => return self.interrupt(&format!("turn generation failed: {e}")).await,
        };

        let reply = candidates[0].text.clone();
        let segment_id = self.aggregator.next_segment_id();

        if Flow::is_completion(&reply) {
            // The sentinel is a termination signal, never conversational
            // content; its segment carries no candidates.
            self.aggregator.add_segment(DialogueSegment {
                segment_id,
                modality: flow.modality().to_string(),
                start_time: started,
                end_time: Utc::now(),
                transcript,
                candidate_responses: Vec::new(),
                chosen_response: None,
            })?;
            self.cursor = self.history.len();
            self.state = SessionState::Complete;

            let outcome = self.post_process().await?;
            return Ok(Turn::Completed(Box::new(outcome)));
        }

        self.aggregator.add_segment(DialogueSegment {
            segment_id,
            modality: flow.modality().to_string(),
            start_time: started,
            end_time: Utc::now(),
            transcript,
            candidate_responses: candidates.clone(),
            chosen_response: None,
        })?;
        self.history.push(ChatMessage::assistant(reply.clone()));
        self.cursor = self.history.len();

        Ok(Turn::Reply {
            segment_id,
            text: reply,
            candidates,
        })
    }

    /// Produce the configured number of candidate responses for this turn.
    /// The first candidate is the canonical reply.
    async fn generate_candidates(
        &mut self,
        flow: Flow,
    ) -> std::result::Result<Vec<CandidateResponse>, AgentError> {
        let count = self.config.candidate_count.max(1);
        let mut candidates = Vec::with_capacity(count);
        for i in 0..count {
            let reply = self.invoke_with_retry(flow.instructions()).await?;
            candidates.push(CandidateResponse {
                response_id: format!("res{}", i + 1),
                text: reply.trim().to_string(),
            });
        }
        Ok(candidates)
    }

    /// One invocation with a single retry; the transient fault is recorded
    /// as a dynamic adjustment.
    async fn invoke_with_retry(
        &mut self,
        instructions: &str,
    ) -> std::result::Result<String, AgentError> {
        match self.invoker.invoke(instructions, &self.history).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.aggregator
                    .record_adjustment(format!("transient agent fault, retrying: {e}"));
                self.invoker.invoke(instructions, &self.history).await
            }
        }
    }

    /// Post-session analyses, fragment merge, reinforcement, and logging
    async fn post_process(&mut self) -> Result<SessionOutcome> {
        self.state = SessionState::PostProcessing;

        let mood = match self
            .invoke_with_retry(MOOD_INSTRUCTIONS)
            .await
            .and_then(|r| parse_mood(&r))
        {
            Ok(mood) => mood,
            Err(e) => {
                self.aggregator
                    .record_adjustment(format!("mood analysis failed: {e}"));
                Vec::new()
            }
        };

        let summary = match self
            .invoke_with_retry(SUMMARY_INSTRUCTIONS)
            .await
            .and_then(|r| parse_summary(&r))
        {
            Ok(summary) => summary,
            Err(e) => {
                self.aggregator
                    .record_adjustment(format!("caregiver summary failed: {e}"));
                SessionSummary {
                    overall_sentiment: "unknown".to_string(),
                    notes: "Caregiver summary unavailable for this session.".to_string(),
                    clinician_recommendation: String::new(),
                }
            }
        };

        self.aggregator.close(mood, summary)?;

        let fragment = match self
            .invoke_with_retry(EXTRACTION_INSTRUCTIONS)
            .await
            .and_then(|r| parse_fragment(&r))
        {
            Ok(fragment) => fragment,
            Err(e) => {
                self.aggregator
                    .record_adjustment(format!("memory extraction failed: {e}"));
                MemoryFragment::default()
            }
        };

        // A failed merge must not cost us the session record; it degrades
        // to an adjustment entry instead.
        let merge_report = if fragment.is_empty() {
            MergeReport::default()
        } else {
            match self.bank.merge_fragment(&fragment).await {
                Ok(report) => report,
                Err(e) => {
                    self.aggregator
                        .record_adjustment(format!("memory merge failed: {e}"));
                    MergeReport::default()
                }
            }
        };

        // Everything the patient recalled this session gets reinforced
        let recalled = fragment.referenced_ids();
        for id in &recalled {
            if let Err(e) = self.bank.reinforce(id, 1.0).await {
                warn!(%id, error = %e, "skipping reinforcement");
            }
        }

        // Surfaced memories the session never came back to count as failed
        // recalls and decay toward the floor
        for id in &self.surfaced_ids {
            if recalled.contains(id) {
                continue;
            }
            if let Err(e) = self.bank.decay(id).await {
                warn!(%id, error = %e, "skipping decay");
            }
        }

        self.finalize().await?;
        Ok(SessionOutcome {
            record: self.aggregator.to_record(),
            merge_report,
        })
    }

    /// Close the session degraded and log whatever was collected. Used for
    /// unrecoverable faults and for callers abandoning a session; collected
    /// segments are never lost.
    pub async fn abort(&mut self, reason: &str) -> Result<SessionRecord> {
        warn!(session_id = %self.session_id(), reason, "closing session degraded");
        self.aggregator.record_adjustment(format!("closing degraded: {reason}"));
        if !self.aggregator.is_closed() {
            self.aggregator
                .close(Vec::new(), SessionSummary::interrupted(reason))?;
        }
        self.finalize().await?;
        Ok(self.aggregator.to_record())
    }

    /// Abort and surface `FlowInterrupted` to the driving caller
    async fn interrupt(&mut self, reason: &str) -> Result<Turn> {
        let session_id = self.session_id().to_string();
        self.abort(reason).await?;
        Err(SessionError::FlowInterrupted {
            session_id,
            reason: reason.to_string(),
        }
        .into())
    }

    /// Append the closed record to the durable session log
    async fn finalize(&mut self) -> Result<()> {
        let record = self.aggregator.to_record();
        self.log.append(&record).await?;
        self.state = SessionState::Logged;
        info!(
            session_id = %record.session_id,
            segments = record.dialogue_segments.len(),
            "session logged"
        );
        Ok(())
    }
}

/// Render the seed context drawn from a prior session record
fn prior_session_context(prior: &SessionRecord) -> String {
    let mut context = format!(
        "Context from this participant's previous session on {}.",
        prior.start_time.format("%Y-%m-%d")
    );
    if !prior.mood.is_empty() {
        context.push_str(&format!(" Mood then: {}.", prior.mood.join(", ")));
    }
    if let Some(summary) = &prior.session_summary {
        if !summary.notes.is_empty() {
            context.push_str(&format!(" Notes: {}", summary.notes));
        }
        if !summary.clinician_recommendation.is_empty() {
            context.push_str(&format!(
                " Recommended focus: {}",
                summary.clinician_recommendation
            ));
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_prior_session_context_renders_available_fields() {
        let prior = SessionRecord {
            session_id: SessionId::try_from("session_x_1").unwrap(),
            patient_id: "patient_1".to_string(),
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            mood: vec!["calm".to_string(), "nostalgic".to_string()],
            dialogue_segments: vec![],
            dynamic_adjustments: vec![],
            session_summary: Some(SessionSummary {
                overall_sentiment: "positive".to_string(),
                notes: "Spoke warmly about the lake house.".to_string(),
                clinician_recommendation: "Revisit the lake house.".to_string(),
            }),
        };

        let context = prior_session_context(&prior);
        assert!(context.contains("calm, nostalgic"));
        assert!(context.contains("lake house"));
        assert!(context.contains("Recommended focus"));
    }

    #[test]
    fn test_prior_session_context_without_summary() {
        let prior = SessionRecord {
            session_id: SessionId::try_from("session_x_2").unwrap(),
            patient_id: "patient_1".to_string(),
            start_time: Utc::now(),
            end_time: None,
            mood: vec![],
            dialogue_segments: vec![],
            dynamic_adjustments: vec![],
            session_summary: None,
        };

        let context = prior_session_context(&prior);
        assert!(context.starts_with("Context from this participant's previous session"));
        assert!(!context.contains("Mood then"));
    }
}
