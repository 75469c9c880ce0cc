//! One-time migration from the retired `nodes`/`links` document shape
//!
//! Early iterations of the bank persisted a flat node list with a `type`
//! discriminator and a `links` array. The canonical document keeps the
//! collections separate; this module converts the old shape once and is the
//! only code that understands it.

use serde::Deserialize;
use tracing::{info, warn};

use crate::bank::store::MemoryBank;
use crate::bank::types::{Connection, Event, Location, Person};
use crate::error::{Result, ReverieError};

#[derive(Debug, Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    nodes: Vec<LegacyNode>,
    #[serde(default)]
    links: Vec<LegacyLink>,
}

#[derive(Debug, Deserialize)]
struct LegacyNode {
    id: String,
    name: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, rename = "recall_strength")]
    recall_strength: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct LegacyLink {
    source: String,
    target: String,
    #[serde(default = "default_link_strength")]
    strength: f32,
}

fn default_link_strength() -> f32 {
    crate::bank::types::DEFAULT_EDGE_STRENGTH
}

/// Convert a legacy `nodes`/`links` JSON document into a canonical bank.
///
/// Person nodes carry no relationship in the old shape, so it is left empty
/// for a caregiver to fill in later; event nodes used `name` as their only
/// text, which becomes the description. Duplicate node ids and duplicate
/// link pairs are collapsed, keeping the first occurrence.
pub fn migrate_legacy(content: &str) -> Result<MemoryBank> {
    let doc: LegacyDocument = serde_json::from_str(content)
        .map_err(|e| ReverieError::CorruptStore(format!("malformed legacy document: {e}")))?;

    let mut bank = MemoryBank::default();
    for node in doc.nodes {
        if bank.contains_entity(&node.id) {
            warn!(id = %node.id, "skipping duplicate legacy node");
            continue;
        }
        match node.node_type.to_ascii_lowercase().as_str() {
            "person" => bank.upsert_entity(
                Person {
                    id: node.id,
                    name: node.name,
                    age: None,
                    relationship: String::new(),
                    description: String::new(),
                    tags: node.tags,
                    recall_strength: node.recall_strength,
                }
                .into(),
            )?,
            "event" => bank.upsert_entity(
                Event {
                    id: node.id,
                    date: None,
                    description: node.name,
                    tags: node.tags,
                    related_people: vec![],
                    related_places: vec![],
                    recall_strength: node.recall_strength,
                }
                .into(),
            )?,
            "location" | "place" => bank.upsert_entity(
                Location {
                    id: node.id,
                    name: node.name,
                    address: None,
                    description: String::new(),
                    recall_strength: node.recall_strength,
                }
                .into(),
            )?,
            other => {
                return Err(ReverieError::CorruptStore(format!(
                    "legacy node {} has unknown type: {other}",
                    node.id
                )));
            }
        }
    }

    let mut skipped = 0usize;
    for link in doc.links {
        if !bank.contains_entity(&link.source) || !bank.contains_entity(&link.target) {
            warn!(source = %link.source, target = %link.target, "skipping dangling legacy link");
            skipped += 1;
            continue;
        }
        if bank.connection_exists(&link.source, &link.target, false) {
            continue;
        }
        bank.insert_connection(
            Connection {
                source: link.source,
                target: link.target,
                strength: link.strength,
            },
            false,
        )?;
    }

    info!(
        entities = bank.entity_count(),
        connections = bank.connections.len(),
        skipped_links = skipped,
        "migrated legacy memory bank"
    );
    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        "nodes": [
            {"id": "p1", "name": "Emily", "type": "person", "tags": ["family"], "recall_strength": 0.9},
            {"id": "e1", "name": "Trip to Japan", "type": "event"},
            {"id": "l1", "name": "Tokyo", "type": "location", "recall_strength": 0.7}
        ],
        "links": [
            {"source": "p1", "target": "e1", "strength": 0.8},
            {"source": "e1", "target": "p1", "strength": 0.3},
            {"source": "e1", "target": "l1", "strength": 0.9},
            {"source": "e1", "target": "missing", "strength": 0.5}
        ]
    }"#;

    #[test]
    fn test_migrate_converts_each_node_type() {
        let bank = migrate_legacy(LEGACY).unwrap();

        assert_eq!(bank.people.len(), 1);
        assert_eq!(bank.people[0].name, "Emily");
        assert_eq!(bank.people[0].recall_strength, Some(0.9));
        assert!(bank.people[0].relationship.is_empty());

        assert_eq!(bank.events.len(), 1);
        assert_eq!(bank.events[0].description, "Trip to Japan");
        assert_eq!(bank.events[0].recall_strength, None);

        assert_eq!(bank.locations.len(), 1);
        assert_eq!(bank.locations[0].name, "Tokyo");
    }

    #[test]
    fn test_migrate_dedups_links_and_drops_dangling() {
        let bank = migrate_legacy(LEGACY).unwrap();

        // (p1, e1) and (e1, p1) collapse into one undirected connection;
        // the link to "missing" is dropped.
        assert_eq!(bank.connections.len(), 2);
        assert!(bank.connection_exists("p1", "e1", false));
        assert!(bank.connection_exists("e1", "l1", false));
    }

    #[test]
    fn test_migrate_rejects_unknown_node_type() {
        let doc = r#"{"nodes": [{"id": "x1", "name": "X", "type": "starship"}], "links": []}"#;
        assert!(matches!(
            migrate_legacy(doc),
            Err(ReverieError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_migrated_bank_loads_canonically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_bank.json");
        let store = crate::bank::store::EntityStore::new(&path);

        let bank = migrate_legacy(LEGACY).unwrap();
        store.save(&bank).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, bank);
    }
}
