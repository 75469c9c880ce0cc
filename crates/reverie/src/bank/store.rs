//! The memory bank and its file-backed store
//!
//! `MemoryBank` owns every entity and connection as one unit. It is loaded
//! fully into memory at startup and flushed atomically on every mutation;
//! whole-document read-modify-write is fine at the expected scale of
//! hundreds to low thousands of entities.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bank::types::{Connection, EntityKind, Event, Location, MemoryEntity, Person};
use crate::error::{Result, ReverieError};

/// The canonical persisted memory bank document.
///
/// Insertion order is preserved within each collection; entity iteration
/// order is people, then events, then locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryBank {
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl MemoryBank {
    pub fn entity_count(&self) -> usize {
        self.people.len() + self.events.len() + self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0 && self.connections.is_empty()
    }

    /// All entities in insertion order (people, events, locations)
    pub fn entities(&self) -> Vec<MemoryEntity> {
        let mut all = Vec::with_capacity(self.entity_count());
        all.extend(self.people.iter().cloned().map(MemoryEntity::Person));
        all.extend(self.events.iter().cloned().map(MemoryEntity::Event));
        all.extend(self.locations.iter().cloned().map(MemoryEntity::Location));
        all
    }

    pub fn contains_entity(&self, id: &str) -> bool {
        self.kind_of(id).is_some()
    }

    /// Which collection holds this id, if any
    pub fn kind_of(&self, id: &str) -> Option<EntityKind> {
        if self.people.iter().any(|p| p.id == id) {
            Some(EntityKind::People)
        } else if self.events.iter().any(|e| e.id == id) {
            Some(EntityKind::Events)
        } else if self.locations.iter().any(|l| l.id == id) {
            Some(EntityKind::Locations)
        } else {
            None
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<MemoryEntity> {
        if let Some(p) = self.people.iter().find(|p| p.id == id) {
            return Some(MemoryEntity::Person(p.clone()));
        }
        if let Some(e) = self.events.iter().find(|e| e.id == id) {
            return Some(MemoryEntity::Event(e.clone()));
        }
        if let Some(l) = self.locations.iter().find(|l| l.id == id) {
            return Some(MemoryEntity::Location(l.clone()));
        }
        None
    }

    /// Effective recall strength for an entity
    pub fn recall_of(&self, id: &str) -> Option<f32> {
        self.get_by_id(id).map(|e| e.recall())
    }

    /// Set an entity's recall strength (clamped). Returns false for an
    /// unknown id.
    pub fn set_recall(&mut self, id: &str, value: f32) -> bool {
        let clamped = Some(value.clamp(0.0, 1.0));
        if let Some(p) = self.people.iter_mut().find(|p| p.id == id) {
            p.recall_strength = clamped;
            return true;
        }
        if let Some(e) = self.events.iter_mut().find(|e| e.id == id) {
            e.recall_strength = clamped;
            return true;
        }
        if let Some(l) = self.locations.iter_mut().find(|l| l.id == id) {
            l.recall_strength = clamped;
            return true;
        }
        false
    }

    /// Insert the entity if its id is unseen; otherwise replace every
    /// mutable field except `id`, preserving the stored recall strength
    /// unless the incoming entity explicitly carries one.
    pub fn upsert_entity(&mut self, mut entity: MemoryEntity) -> Result<()> {
        if entity.id().is_empty() {
            return Err(ReverieError::InvalidEntity(
                "entity id must not be empty".to_string(),
            ));
        }
        if let Some(s) = entity.recall_raw() {
            entity.set_recall(s);
        }

        match self.kind_of(entity.id()) {
            None => {
                debug!(id = entity.id(), kind = %entity.kind(), "inserting entity");
                self.push_entity(entity);
                Ok(())
            }
            Some(kind) if kind == entity.kind() => {
                let existing_recall = self
                    .get_by_id(entity.id())
                    .and_then(|e| e.recall_raw());
                if entity.recall_raw().is_none() {
                    if let Some(r) = existing_recall {
                        entity.set_recall(r);
                    }
                }
                debug!(id = entity.id(), kind = %entity.kind(), "replacing entity");
                self.replace_entity(entity);
                Ok(())
            }
            Some(kind) => Err(ReverieError::InvalidEntity(format!(
                "entity {} already exists as {}",
                entity.id(),
                kind
            ))),
        }
    }

    fn push_entity(&mut self, entity: MemoryEntity) {
        match entity {
            MemoryEntity::Person(p) => self.people.push(p),
            MemoryEntity::Event(e) => self.events.push(e),
            MemoryEntity::Location(l) => self.locations.push(l),
        }
    }

    fn replace_entity(&mut self, entity: MemoryEntity) {
        match entity {
            MemoryEntity::Person(p) => {
                if let Some(slot) = self.people.iter_mut().find(|x| x.id == p.id) {
                    *slot = p;
                }
            }
            MemoryEntity::Event(e) => {
                if let Some(slot) = self.events.iter_mut().find(|x| x.id == e.id) {
                    *slot = e;
                }
            }
            MemoryEntity::Location(l) => {
                if let Some(slot) = self.locations.iter_mut().find(|x| x.id == l.id) {
                    *slot = l;
                }
            }
        }
    }

    /// Whether a connection for this pair already exists
    pub fn connection_exists(&self, source: &str, target: &str, directed: bool) -> bool {
        self.connections
            .iter()
            .any(|c| pair_matches(c, source, target, directed))
    }

    /// Insert or update the connection for this pair. Both endpoints must
    /// already exist in the bank.
    pub fn upsert_connection(&mut self, mut conn: Connection, directed: bool) -> Result<()> {
        self.check_endpoints(&conn)?;
        conn.strength = conn.strength.clamp(0.0, 1.0);

        if let Some(existing) = self
            .connections
            .iter_mut()
            .find(|c| pair_matches(c, &conn.source, &conn.target, directed))
        {
            debug!(source = %conn.source, target = %conn.target, "updating connection");
            existing.strength = conn.strength;
        } else {
            debug!(source = %conn.source, target = %conn.target, "inserting connection");
            self.connections.push(conn);
        }
        Ok(())
    }

    /// Insert a connection that must not already exist. Callers dedup by
    /// pair key first; a `DuplicateConnection` from here means that check
    /// was skipped.
    pub fn insert_connection(&mut self, mut conn: Connection, directed: bool) -> Result<()> {
        self.check_endpoints(&conn)?;
        if self.connection_exists(&conn.source, &conn.target, directed) {
            return Err(ReverieError::DuplicateConnection {
                src: conn.source,
                target: conn.target,
            });
        }
        conn.strength = conn.strength.clamp(0.0, 1.0);
        self.connections.push(conn);
        Ok(())
    }

    fn check_endpoints(&self, conn: &Connection) -> Result<()> {
        for id in [&conn.source, &conn.target] {
            if !self.contains_entity(id) {
                return Err(ReverieError::UnknownEntity(id.clone()));
            }
        }
        Ok(())
    }

    /// Structural validation applied at the store boundary. Out-of-range
    /// strengths are clamped; duplicate ids and dangling connections reject
    /// the whole document.
    fn validate(&mut self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for entity in self.entities() {
            if !seen.insert(entity.id().to_string()) {
                return Err(ReverieError::CorruptStore(format!(
                    "duplicate entity id: {}",
                    entity.id()
                )));
            }
        }

        for conn in &self.connections {
            for id in [&conn.source, &conn.target] {
                if !seen.contains(id) {
                    return Err(ReverieError::CorruptStore(format!(
                        "connection references unknown entity: {id}"
                    )));
                }
            }
        }

        for entity in self.entities() {
            if let Some(s) = entity.recall_raw() {
                if !(0.0..=1.0).contains(&s) {
                    warn!(id = entity.id(), strength = s, "clamping out-of-range recall strength");
                    self.set_recall(entity.id(), s);
                }
            }
        }
        for conn in &mut self.connections {
            if !(0.0..=1.0).contains(&conn.strength) {
                warn!(source = %conn.source, target = %conn.target, "clamping out-of-range connection strength");
                conn.strength = conn.strength.clamp(0.0, 1.0);
            }
        }
        Ok(())
    }
}

/// Normalize a pair comparison for the configured directionality
fn pair_matches(conn: &Connection, source: &str, target: &str, directed: bool) -> bool {
    if conn.source == source && conn.target == target {
        return true;
    }
    !directed && conn.source == target && conn.target == source
}

/// File-backed storage for a [`MemoryBank`]
#[derive(Debug, Clone)]
pub struct EntityStore {
    path: PathBuf,
}

impl EntityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full bank from disk.
    ///
    /// A missing file is not an error; it yields an empty bank. A present
    /// but unreadable document, or one in the retired `nodes`/`links`
    /// shape, fails with `CorruptStore`.
    pub fn load(&self) -> Result<MemoryBank> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no memory bank on disk, starting empty");
                return Ok(MemoryBank::default());
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| ReverieError::CorruptStore(format!("invalid JSON: {e}")))?;

        if value.get("nodes").is_some() || value.get("links").is_some() {
            return Err(ReverieError::CorruptStore(
                "document uses the retired nodes/links schema; run `reverie-cli migrate` first"
                    .to_string(),
            ));
        }

        let mut bank: MemoryBank = serde_json::from_value(value)
            .map_err(|e| ReverieError::CorruptStore(format!("malformed memory bank: {e}")))?;
        bank.validate()?;
        debug!(
            entities = bank.entity_count(),
            connections = bank.connections.len(),
            "loaded memory bank"
        );
        Ok(bank)
    }

    /// Write the full bank atomically: serialize to a temp file in the same
    /// directory, then rename over the target so a crash never leaves a
    /// partial document.
    pub fn save(&self, bank: &MemoryBank) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&tmp, bank)
            .map_err(|e| ReverieError::Serialization(e.to_string()))?;
        tmp.persist(&self.path).map_err(|e| ReverieError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::types::{Location, Person};

    fn person(id: &str, name: &str) -> Person {
        Person {
            id: id.to_string(),
            name: name.to_string(),
            age: None,
            relationship: "Friend".to_string(),
            description: String::new(),
            tags: vec![],
            recall_strength: None,
        }
    }

    fn location(id: &str, name: &str) -> Location {
        Location {
            id: id.to_string(),
            name: name.to_string(),
            address: None,
            description: String::new(),
            recall_strength: None,
        }
    }

    #[test]
    fn test_upsert_inserts_then_replaces() {
        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("p1", "Emily").into()).unwrap();
        assert_eq!(bank.people.len(), 1);

        let mut updated = person("p1", "Emily Carter");
        updated.relationship = "Cousin".to_string();
        bank.upsert_entity(updated.into()).unwrap();

        assert_eq!(bank.people.len(), 1);
        assert_eq!(bank.people[0].name, "Emily Carter");
        assert_eq!(bank.people[0].relationship, "Cousin");
    }

    #[test]
    fn test_upsert_preserves_recall_strength_unless_supplied() {
        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("p1", "Emily").into()).unwrap();
        bank.set_recall("p1", 0.9);

        // No strength on the incoming entity: stored value survives
        bank.upsert_entity(person("p1", "Emily C.").into()).unwrap();
        assert_eq!(bank.recall_of("p1"), Some(0.9));

        // Explicit strength replaces it, clamped
        let mut explicit = person("p1", "Emily C.");
        explicit.recall_strength = Some(1.7);
        bank.upsert_entity(explicit.into()).unwrap();
        assert_eq!(bank.recall_of("p1"), Some(1.0));
    }

    #[test]
    fn test_upsert_rejects_kind_conflict() {
        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("x1", "Emily").into()).unwrap();

        let result = bank.upsert_entity(location("x1", "Tokyo").into());
        assert!(matches!(result, Err(ReverieError::InvalidEntity(_))));
    }

    #[test]
    fn test_upsert_rejects_empty_id() {
        let mut bank = MemoryBank::default();
        let result = bank.upsert_entity(person("", "Nameless").into());
        assert!(matches!(result, Err(ReverieError::InvalidEntity(_))));
    }

    #[test]
    fn test_connection_dedup_unordered() {
        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("p1", "Emily").into()).unwrap();
        bank.upsert_entity(location("l1", "Tokyo").into()).unwrap();

        bank.upsert_connection(
            Connection {
                source: "p1".to_string(),
                target: "l1".to_string(),
                strength: 0.5,
            },
            false,
        )
        .unwrap();

        // Reversed pair updates the same connection when undirected
        bank.upsert_connection(
            Connection {
                source: "l1".to_string(),
                target: "p1".to_string(),
                strength: 0.8,
            },
            false,
        )
        .unwrap();

        assert_eq!(bank.connections.len(), 1);
        assert_eq!(bank.connections[0].strength, 0.8);
    }

    #[test]
    fn test_connection_directed_keeps_both_arcs() {
        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("p1", "Emily").into()).unwrap();
        bank.upsert_entity(location("l1", "Tokyo").into()).unwrap();

        for (s, t) in [("p1", "l1"), ("l1", "p1")] {
            bank.upsert_connection(
                Connection {
                    source: s.to_string(),
                    target: t.to_string(),
                    strength: 0.5,
                },
                true,
            )
            .unwrap();
        }
        assert_eq!(bank.connections.len(), 2);
    }

    #[test]
    fn test_connection_requires_known_endpoints() {
        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("p1", "Emily").into()).unwrap();

        let result = bank.upsert_connection(
            Connection {
                source: "p1".to_string(),
                target: "ghost".to_string(),
                strength: 0.5,
            },
            false,
        );
        assert!(matches!(result, Err(ReverieError::UnknownEntity(id)) if id == "ghost"));
    }

    #[test]
    fn test_insert_connection_rejects_existing_pair() {
        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("p1", "Emily").into()).unwrap();
        bank.upsert_entity(location("l1", "Tokyo").into()).unwrap();

        let conn = Connection {
            source: "p1".to_string(),
            target: "l1".to_string(),
            strength: 0.5,
        };
        bank.insert_connection(conn.clone(), false).unwrap();
        let result = bank.insert_connection(conn, false);
        assert!(matches!(
            result,
            Err(ReverieError::DuplicateConnection { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_yields_empty_bank() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::new(dir.path().join("memory_bank.json"));
        let bank = store.load().unwrap();
        assert!(bank.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::new(dir.path().join("memory_bank.json"));

        let mut bank = MemoryBank::default();
        bank.upsert_entity(person("p1", "Emily").into()).unwrap();
        bank.upsert_entity(location("l1", "Tokyo").into()).unwrap();
        bank.upsert_connection(
            Connection {
                source: "p1".to_string(),
                target: "l1".to_string(),
                strength: 0.9,
            },
            false,
        )
        .unwrap();
        store.save(&bank).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, bank);
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_bank.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = EntityStore::new(path).load();
        assert!(matches!(result, Err(ReverieError::CorruptStore(_))));
    }

    #[test]
    fn test_load_rejects_legacy_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_bank.json");
        std::fs::write(&path, r#"{"nodes": [], "links": []}"#).unwrap();

        let result = EntityStore::new(path).load();
        match result {
            Err(ReverieError::CorruptStore(msg)) => assert!(msg.contains("migrate")),
            other => panic!("expected CorruptStore, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_bank.json");
        std::fs::write(
            &path,
            r#"{"people": [{"id": "p1", "name": "A"}, {"id": "p1", "name": "B"}]}"#,
        )
        .unwrap();

        let result = EntityStore::new(path).load();
        assert!(matches!(result, Err(ReverieError::CorruptStore(_))));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::new(dir.path().join("memory_bank.json"));
        store.save(&MemoryBank::default()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
