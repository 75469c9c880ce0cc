//! Accumulates one session's dialogue into a durable record
//!
//! The aggregator is owned by exactly one orchestrator for the session's
//! lifetime. Segments are append-only, the record closes exactly once, and
//! `to_record` hands out immutable snapshots for logging.

use chrono::Utc;
use tracing::debug;

use crate::session::types::{
    DialogueSegment, DynamicAdjustment, SessionId, SessionRecord, SessionSummary,
};
use crate::session::SessionError;

/// Builder for a [`SessionRecord`], enforcing the session lifecycle
#[derive(Debug)]
pub struct SessionAggregator {
    record: SessionRecord,
}

impl SessionAggregator {
    /// Create a new open session record starting now
    pub fn start(session_id: SessionId, patient_id: impl Into<String>) -> Self {
        Self {
            record: SessionRecord {
                session_id,
                patient_id: patient_id.into(),
                start_time: Utc::now(),
                end_time: None,
                mood: Vec::new(),
                dialogue_segments: Vec::new(),
                dynamic_adjustments: Vec::new(),
                session_summary: None,
            },
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.record.session_id
    }

    pub fn patient_id(&self) -> &str {
        &self.record.patient_id
    }

    pub fn is_closed(&self) -> bool {
        self.record.end_time.is_some()
    }

    /// The id the next segment must carry (segments count from 1)
    pub fn next_segment_id(&self) -> u64 {
        self.record.dialogue_segments.len() as u64 + 1
    }

    pub fn segments(&self) -> &[DialogueSegment] {
        &self.record.dialogue_segments
    }

    /// Append a segment. Segments are never reordered or removed, and ids
    /// must arrive strictly increasing.
    pub fn add_segment(&mut self, segment: DialogueSegment) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::AlreadyClosed);
        }
        debug_assert_eq!(segment.segment_id, self.next_segment_id());
        self.record.dialogue_segments.push(segment);
        Ok(())
    }

    /// Record a free-form adjustment note (fault, fallback, change of
    /// course). Allowed at any point before the record is logged.
    pub fn record_adjustment(&mut self, note: impl Into<String>) {
        let note = note.into();
        debug!(session_id = %self.record.session_id, %note, "dynamic adjustment");
        self.record.dynamic_adjustments.push(DynamicAdjustment {
            at: Utc::now(),
            note,
        });
    }

    /// Mark the picked candidate on the segment that offered it
    pub fn choose_response(&mut self, response_id: &str) -> bool {
        for segment in self.record.dialogue_segments.iter_mut().rev() {
            if segment
                .candidate_responses
                .iter()
                .any(|c| c.response_id == response_id)
            {
                segment.chosen_response = Some(response_id.to_string());
                return true;
            }
        }
        false
    }

    /// Close the session: set the end time, mood, and summary. Closing
    /// twice is a programmer error.
    pub fn close(
        &mut self,
        mood: Vec<String>,
        summary: SessionSummary,
    ) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::AlreadyClosed);
        }
        self.record.end_time = Some(Utc::now());
        self.record.mood = mood;
        self.record.session_summary = Some(summary);
        Ok(())
    }

    /// Immutable snapshot of the record as it stands
    pub fn to_record(&self) -> SessionRecord {
        self.record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::CandidateResponse;

    fn segment(id: u64) -> DialogueSegment {
        DialogueSegment {
            segment_id: id,
            modality: "srt".to_string(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            transcript: format!("patient: turn {id}"),
            candidate_responses: vec![CandidateResponse {
                response_id: format!("res{id}"),
                text: "A reply".to_string(),
            }],
            chosen_response: None,
        }
    }

    fn aggregator() -> SessionAggregator {
        SessionAggregator::start(SessionId::generate(), "patient_1")
    }

    #[test]
    fn test_start_opens_empty_record() {
        let agg = aggregator();
        assert!(!agg.is_closed());
        assert_eq!(agg.next_segment_id(), 1);
        let record = agg.to_record();
        assert!(record.end_time.is_none());
        assert!(record.dialogue_segments.is_empty());
        assert!(record.session_summary.is_none());
    }

    #[test]
    fn test_segments_append_in_order() {
        let mut agg = aggregator();
        agg.add_segment(segment(1)).unwrap();
        agg.add_segment(segment(2)).unwrap();
        agg.add_segment(segment(3)).unwrap();

        let ids: Vec<u64> = agg.segments().iter().map(|s| s.segment_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(agg.next_segment_id(), 4);
    }

    #[test]
    fn test_close_exactly_once() {
        let mut agg = aggregator();
        agg.close(
            vec!["calm".to_string()],
            SessionSummary {
                overall_sentiment: "positive".to_string(),
                notes: "Fine".to_string(),
                clinician_recommendation: String::new(),
            },
        )
        .unwrap();

        assert!(agg.is_closed());
        let second = agg.close(vec![], SessionSummary::interrupted("again"));
        assert!(matches!(second, Err(SessionError::AlreadyClosed)));
    }

    #[test]
    fn test_no_segments_after_close() {
        let mut agg = aggregator();
        agg.close(vec![], SessionSummary::interrupted("test")).unwrap();
        assert!(matches!(
            agg.add_segment(segment(1)),
            Err(SessionError::AlreadyClosed)
        ));
    }

    #[test]
    fn test_choose_response_marks_owning_segment() {
        let mut agg = aggregator();
        agg.add_segment(segment(1)).unwrap();
        agg.add_segment(segment(2)).unwrap();

        assert!(agg.choose_response("res1"));
        assert_eq!(
            agg.segments()[0].chosen_response.as_deref(),
            Some("res1")
        );
        assert!(agg.segments()[1].chosen_response.is_none());

        assert!(!agg.choose_response("res99"));
    }

    #[test]
    fn test_adjustments_accumulate() {
        let mut agg = aggregator();
        agg.record_adjustment("classifier retry after transient fault");
        agg.record_adjustment("fell back to srt flow");

        let record = agg.to_record();
        assert_eq!(record.dynamic_adjustments.len(), 2);
        assert!(record.dynamic_adjustments[0].note.contains("retry"));
    }
}
