//! The memory bank: typed entities, weighted connections, and persistence
//!
//! People, events, and locations with spaced-reinforcement recall strengths,
//! persisted as one JSON document and shared between sessions through a
//! single-writer facade.

pub mod migrate;
pub mod shared;
pub mod store;
pub mod types;

pub use migrate::migrate_legacy;
pub use shared::SharedBank;
pub use store::{EntityStore, MemoryBank};
pub use types::{
    Connection, EntityKind, EntityLink, Event, Location, MemoryEntity, Person,
    DEFAULT_EDGE_STRENGTH, DEFAULT_RECALL_STRENGTH,
};
