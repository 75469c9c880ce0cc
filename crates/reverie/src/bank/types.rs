//! Memory entity types for the Reverie bank
//!
//! Defines the three entity variants (person, event, location), weighted
//! connections between them, and the recall strength accessors shared by all
//! variants.

use serde::{Deserialize, Serialize};

/// Recall strength applied when an entity does not carry one
pub const DEFAULT_RECALL_STRENGTH: f32 = 0.5;

/// Default strength for connections and entity links
pub const DEFAULT_EDGE_STRENGTH: f32 = 0.5;

/// A person remembered by the patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Unique identifier, stable across updates, never reused
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    /// Relationship to the patient ("Cousin", "Friend", "Caregiver", ...)
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Absent on the wire means "leave the stored value alone" on upsert and
    /// defaults to 0.5 on first insertion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_strength: Option<f32>,
}

/// A remembered event, linked to the people and places involved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_people: Vec<EntityLink>,
    #[serde(default)]
    pub related_places: Vec<EntityLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_strength: Option<f32>,
}

/// A remembered place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_strength: Option<f32>,
}

/// A weighted reference from an event to a person or place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLink {
    pub id: String,
    #[serde(default = "default_edge_strength", alias = "recall_strength")]
    pub edge_strength: f32,
}

/// A weighted connection between two entities in the bank.
///
/// At most one connection exists per (source, target) pair; whether the pair
/// is directed is a bank-level setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
    /// Strength in [0.0, 1.0]. The legacy documents wrote this field as
    /// `recall_strength`; it is accepted on input and always written back as
    /// `strength`.
    #[serde(default = "default_edge_strength", alias = "recall_strength")]
    pub strength: f32,
}

fn default_edge_strength() -> f32 {
    DEFAULT_EDGE_STRENGTH
}

/// The collection an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    People,
    Events,
    Locations,
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "people" | "person" => Ok(EntityKind::People),
            "events" | "event" => Ok(EntityKind::Events),
            "locations" | "location" | "places" | "place" => Ok(EntityKind::Locations),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::People => "people",
            EntityKind::Events => "events",
            EntityKind::Locations => "locations",
        };
        write!(f, "{s}")
    }
}

/// A memory entity of any variant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MemoryEntity {
    Person(Person),
    Event(Event),
    Location(Location),
}

impl MemoryEntity {
    pub fn id(&self) -> &str {
        match self {
            MemoryEntity::Person(p) => &p.id,
            MemoryEntity::Event(e) => &e.id,
            MemoryEntity::Location(l) => &l.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            MemoryEntity::Person(_) => EntityKind::People,
            MemoryEntity::Event(_) => EntityKind::Events,
            MemoryEntity::Location(_) => EntityKind::Locations,
        }
    }

    /// The text surfaced to the patient and matched by fuzzy search: the
    /// name for people and locations, the description for events.
    pub fn display_text(&self) -> &str {
        match self {
            MemoryEntity::Person(p) => &p.name,
            MemoryEntity::Event(e) => &e.description,
            MemoryEntity::Location(l) => &l.name,
        }
    }

    /// Recall strength, defaulting when the entity never had one assigned
    pub fn recall(&self) -> f32 {
        self.recall_raw().unwrap_or(DEFAULT_RECALL_STRENGTH)
    }

    /// Raw recall strength as stored; `None` means "never explicitly set"
    pub fn recall_raw(&self) -> Option<f32> {
        match self {
            MemoryEntity::Person(p) => p.recall_strength,
            MemoryEntity::Event(e) => e.recall_strength,
            MemoryEntity::Location(l) => l.recall_strength,
        }
    }

    /// Set the recall strength, clamped to [0.0, 1.0]
    pub fn set_recall(&mut self, value: f32) {
        let clamped = Some(value.clamp(0.0, 1.0));
        match self {
            MemoryEntity::Person(p) => p.recall_strength = clamped,
            MemoryEntity::Event(e) => e.recall_strength = clamped,
            MemoryEntity::Location(l) => l.recall_strength = clamped,
        }
    }
}

impl From<Person> for MemoryEntity {
    fn from(p: Person) -> Self {
        MemoryEntity::Person(p)
    }
}

impl From<Event> for MemoryEntity {
    fn from(e: Event) -> Self {
        MemoryEntity::Event(e)
    }
}

impl From<Location> for MemoryEntity {
    fn from(l: Location) -> Self {
        MemoryEntity::Location(l)
    }
}
