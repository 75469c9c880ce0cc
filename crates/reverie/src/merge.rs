//! Idempotent merge of extracted memory fragments into the bank
//!
//! Fragments arrive from conversation analysis as partial bank-shaped
//! payloads. Merging is deliberately non-destructive toward existing detail:
//! entities whose ids are already present are skipped entirely, and
//! connections are added only for unseen (source, target) pairs. Applying
//! the same fragment twice therefore changes nothing the second time.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bank::store::MemoryBank;
use crate::bank::types::{Connection, Event, Location, MemoryEntity, Person};
use crate::error::Result;

/// A partial memory payload extracted from conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFragment {
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl MemoryFragment {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.events.is_empty()
            && self.locations.is_empty()
            && self.connections.is_empty()
    }

    /// Every entity id the fragment mentions (entities and connection
    /// endpoints), deduplicated, in first-mention order. These are the
    /// entities recalled during the session and therefore reinforced.
    pub fn referenced_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        let mut push = |id: &str| {
            if !id.is_empty() && seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        };

        for p in &self.people {
            push(&p.id);
        }
        for e in &self.events {
            push(&e.id);
        }
        for l in &self.locations {
            push(&l.id);
        }
        for c in &self.connections {
            push(&c.source);
            push(&c.target);
        }
        ids
    }
}

/// What a merge actually changed, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub entities_added: usize,
    pub connections_added: usize,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.entities_added == 0 && self.connections_added == 0
    }
}

/// Fold a fragment into the bank, adding only what is missing.
///
/// Connections whose endpoints are unknown even after the fragment's own
/// entities were added are dropped with a warning rather than failing the
/// merge.
pub fn merge(bank: &mut MemoryBank, fragment: &MemoryFragment, directed: bool) -> Result<MergeReport> {
    let mut report = MergeReport::default();

    let entities = fragment
        .people
        .iter()
        .cloned()
        .map(MemoryEntity::Person)
        .chain(fragment.events.iter().cloned().map(MemoryEntity::Event))
        .chain(fragment.locations.iter().cloned().map(MemoryEntity::Location));

    for entity in entities {
        if bank.contains_entity(entity.id()) {
            continue;
        }
        bank.upsert_entity(entity)?;
        report.entities_added += 1;
    }

    for conn in &fragment.connections {
        if !bank.contains_entity(&conn.source) || !bank.contains_entity(&conn.target) {
            warn!(source = %conn.source, target = %conn.target, "dropping connection to unknown entity");
            continue;
        }
        if bank.connection_exists(&conn.source, &conn.target, directed) {
            continue;
        }
        bank.insert_connection(conn.clone(), directed)?;
        report.connections_added += 1;
    }

    if !report.is_empty() {
        info!(
            entities = report.entities_added,
            connections = report.connections_added,
            "merged memory fragment"
        );
    }
    Ok(report)
}
