//! Recall strength dynamics and retrieval
//!
//! Spaced-reinforcement semantics over the memory bank: successful recall
//! strengthens an entity toward 1.0, failed recall decays it toward a floor
//! of 0.1 so nothing is ever fully forgotten. Retrieval is either ranked
//! (highest recall first) or fuzzy text search tolerant of misspellings.

use tracing::debug;

use crate::bank::store::MemoryBank;
use crate::bank::types::{EntityKind, MemoryEntity};
use crate::config::RecallConfig;
use crate::error::{Result, ReverieError};

/// A fuzzy search match with its partial-match score (0-100)
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entity: MemoryEntity,
    pub score: f32,
}

/// Strength-update and retrieval operations over a [`MemoryBank`]
#[derive(Debug, Clone, Default)]
pub struct RecallEngine {
    config: RecallConfig,
}

impl RecallEngine {
    pub fn new(config: RecallConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    /// Strengthen an entity after a successful recall:
    /// `min(1.0, strength + step * difficulty)`. Returns the new strength.
    pub fn reinforce(&self, bank: &mut MemoryBank, id: &str, difficulty: f32) -> Result<f32> {
        let current = bank
            .recall_of(id)
            .ok_or_else(|| ReverieError::UnknownEntity(id.to_string()))?;
        let updated = (current + self.config.reinforce_step * difficulty).min(1.0);
        bank.set_recall(id, updated);
        debug!(id, from = current, to = updated, "reinforced recall");
        Ok(updated)
    }

    /// Weaken an entity after a failed recall:
    /// `max(floor, strength - step)`. The floor keeps every entity
    /// retrievable. Returns the new strength.
    pub fn decay(&self, bank: &mut MemoryBank, id: &str) -> Result<f32> {
        let current = bank
            .recall_of(id)
            .ok_or_else(|| ReverieError::UnknownEntity(id.to_string()))?;
        let updated = (current - self.config.decay_step).max(self.config.decay_floor);
        bank.set_recall(id, updated);
        debug!(id, from = current, to = updated, "decayed recall");
        Ok(updated)
    }

    /// The `n` entities with the highest recall strength. The sort is
    /// stable, so ties keep bank insertion order.
    pub fn top_by_recall(&self, bank: &MemoryBank, n: usize) -> Vec<MemoryEntity> {
        let mut entities = bank.entities();
        entities.sort_by(|a, b| {
            b.recall()
                .partial_cmp(&a.recall())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entities.truncate(n);
        entities
    }

    /// All entities of `kind` whose display text partially matches `query`
    /// with a score of at least `threshold` (0-100), best match first.
    /// Matching is case-insensitive and tolerant of small misspellings.
    pub fn fuzzy_search(
        &self,
        bank: &MemoryBank,
        kind: EntityKind,
        query: &str,
        threshold: f32,
    ) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = bank
            .entities()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .filter_map(|entity| {
                let score = partial_match_score(query, entity.display_text());
                (score >= threshold).then_some(SearchHit { entity, score })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }
}

/// Best partial-match score of `query` against `text` on a 0-100 scale.
///
/// The shorter string is slid over every equal-length window of the longer
/// one and each alignment is scored by normalized edit distance; the best
/// window wins. "Canion" therefore scores ~83 against "Canyon" while sharing
/// no exact substring with it. Comparison is case-insensitive.
pub fn partial_match_score(query: &str, text: &str) -> f32 {
    let a: Vec<char> = query.to_lowercase().chars().collect();
    let b: Vec<char> = text.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (needle, haystack) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let window = needle.len();

    let mut best = similarity(needle, haystack);
    for start in 0..=(haystack.len() - window) {
        let score = similarity(needle, &haystack[start..start + window]);
        if score > best {
            best = score;
        }
    }
    best
}

fn similarity(a: &[char], b: &[char]) -> f32 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 100.0;
    }
    let dist = levenshtein(a, b);
    (1.0 - dist as f32 / max_len as f32) * 100.0
}

/// Classic two-row Levenshtein distance over char slices
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::types::{Location, Person};

    fn bank_with(people: &[(&str, &str)], locations: &[(&str, &str)]) -> MemoryBank {
        let mut bank = MemoryBank::default();
        for (id, name) in people {
            bank.upsert_entity(
                Person {
                    id: id.to_string(),
                    name: name.to_string(),
                    age: None,
                    relationship: String::new(),
                    description: String::new(),
                    tags: vec![],
                    recall_strength: None,
                }
                .into(),
            )
            .unwrap();
        }
        for (id, name) in locations {
            bank.upsert_entity(
                Location {
                    id: id.to_string(),
                    name: name.to_string(),
                    address: None,
                    description: String::new(),
                    recall_strength: None,
                }
                .into(),
            )
            .unwrap();
        }
        bank
    }

    #[test]
    fn test_reinforce_ceiling() {
        let engine = RecallEngine::default();
        let mut bank = bank_with(&[("p1", "Emily")], &[]);
        bank.set_recall("p1", 0.95);

        let updated = engine.reinforce(&mut bank, "p1", 1.0).unwrap();
        assert_eq!(updated, 1.0);

        // Further reinforcement stays at the ceiling
        let updated = engine.reinforce(&mut bank, "p1", 2.0).unwrap();
        assert_eq!(updated, 1.0);
    }

    #[test]
    fn test_reinforce_scales_with_difficulty() {
        let engine = RecallEngine::default();
        let mut bank = bank_with(&[("p1", "Emily")], &[]);

        let updated = engine.reinforce(&mut bank, "p1", 2.0).unwrap();
        assert!((updated - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_decay_floor() {
        let engine = RecallEngine::default();
        let mut bank = bank_with(&[("p1", "Emily")], &[]);

        bank.set_recall("p1", 0.2);
        let updated = engine.decay(&mut bank, "p1").unwrap();
        assert_eq!(updated, 0.1);

        // Never below the floor; the entity stays retrievable
        let updated = engine.decay(&mut bank, "p1").unwrap();
        assert_eq!(updated, 0.1);
    }

    #[test]
    fn test_strength_stays_in_range_over_mixed_sequences() {
        let engine = RecallEngine::default();
        let mut bank = bank_with(&[("p1", "Emily")], &[]);

        for i in 0..50 {
            let s = if i % 3 == 0 {
                engine.decay(&mut bank, "p1").unwrap()
            } else {
                engine.reinforce(&mut bank, "p1", 1.5).unwrap()
            };
            assert!((0.0..=1.0).contains(&s));
            assert!(s >= 0.1);
        }
    }

    #[test]
    fn test_unknown_entity_errors() {
        let engine = RecallEngine::default();
        let mut bank = MemoryBank::default();
        assert!(matches!(
            engine.reinforce(&mut bank, "ghost", 1.0),
            Err(ReverieError::UnknownEntity(_))
        ));
        assert!(matches!(
            engine.decay(&mut bank, "ghost"),
            Err(ReverieError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_top_by_recall_breaks_ties_by_insertion_order() {
        let engine = RecallEngine::default();
        let mut bank = bank_with(&[("p1", "First"), ("p2", "Second"), ("p3", "Third")], &[]);
        bank.set_recall("p1", 0.9);
        bank.set_recall("p2", 0.9);
        bank.set_recall("p3", 0.3);

        let top = engine.top_by_recall(&bank, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id(), "p1");
        assert_eq!(top[1].id(), "p2");

        let all = engine.top_by_recall(&bank, 10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id(), "p3");
    }

    #[test]
    fn test_fuzzy_search_tolerates_misspelling() {
        let engine = RecallEngine::default();
        let bank = bank_with(&[], &[("l1", "Grand Canyon"), ("l2", "Tokyo")]);

        let hits = engine.fuzzy_search(&bank, EntityKind::Locations, "Canion", 80.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.id(), "l1");
        assert!(hits[0].score >= 80.0);
    }

    #[test]
    fn test_fuzzy_search_rejects_noise() {
        let engine = RecallEngine::default();
        let bank = bank_with(&[], &[("l1", "Grand Canyon")]);

        let hits = engine.fuzzy_search(&bank, EntityKind::Locations, "xyz123", 80.0);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_fuzzy_search_is_case_insensitive_and_kind_scoped() {
        let engine = RecallEngine::default();
        let bank = bank_with(&[("p1", "Tokyo Smith")], &[("l1", "Tokyo")]);

        let hits = engine.fuzzy_search(&bank, EntityKind::Locations, "tokyo", 90.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity.kind(), EntityKind::Locations);
    }

    #[test]
    fn test_partial_match_scores() {
        // Exact substring alignment is a perfect partial match
        assert_eq!(partial_match_score("Canyon", "Grand Canyon"), 100.0);
        // One substitution in six characters
        let score = partial_match_score("Canion", "Canyon");
        assert!((score - 83.33).abs() < 0.5, "score was {score}");
        // Empty inputs never match
        assert_eq!(partial_match_score("", "Canyon"), 0.0);
    }

    #[test]
    fn test_levenshtein_distance() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("test"), &chars("test")), 0);
        assert_eq!(levenshtein(&chars("test"), &chars("tests")), 1);
        assert_eq!(levenshtein(&chars("map"), &chars("mpa")), 2);
        assert_eq!(levenshtein(&chars("hello"), &chars("world")), 4);
    }
}
