//! Shared, single-writer access to the memory bank
//!
//! `SharedBank` is the one object concurrent sessions go through to touch
//! the bank. Mutations take the write lock, apply, and flush the whole
//! document atomically before the lock is released, so two sessions
//! reinforcing the same entity can never interleave a read-modify-write and
//! lose an update. Reads take the read lock and see a consistent snapshot.
//!
//! No lock is ever held across an agent invocation; callers read what they
//! need, await the network, then come back for the mutation.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::bank::store::{EntityStore, MemoryBank};
use crate::bank::types::{Connection, EntityKind, MemoryEntity};
use crate::config::{BankConfig, RecallConfig};
use crate::error::Result;
use crate::merge::{self, MemoryFragment, MergeReport};
use crate::recall::{RecallEngine, SearchHit};

/// Thread-safe facade over the bank, its store, and the recall engine
#[derive(Debug, Clone)]
pub struct SharedBank {
    store: EntityStore,
    bank: Arc<RwLock<MemoryBank>>,
    engine: RecallEngine,
    directed: bool,
}

impl SharedBank {
    /// Load the bank from the store and wrap it for shared use
    pub fn open(store: EntityStore, bank_config: &BankConfig, recall_config: RecallConfig) -> Result<Self> {
        let bank = store.load()?;
        Ok(Self {
            store,
            bank: Arc::new(RwLock::new(bank)),
            engine: RecallEngine::new(recall_config),
            directed: bank_config.directed_connections,
        })
    }

    pub fn engine(&self) -> &RecallEngine {
        &self.engine
    }

    /// A point-in-time copy of the whole bank
    pub async fn snapshot(&self) -> MemoryBank {
        self.bank.read().await.clone()
    }

    pub async fn get_by_id(&self, id: &str) -> Option<MemoryEntity> {
        self.bank.read().await.get_by_id(id)
    }

    pub async fn top_by_recall(&self, n: usize) -> Vec<MemoryEntity> {
        let bank = self.bank.read().await;
        self.engine.top_by_recall(&bank, n)
    }

    pub async fn fuzzy_search(
        &self,
        kind: EntityKind,
        query: &str,
        threshold: f32,
    ) -> Vec<SearchHit> {
        let bank = self.bank.read().await;
        self.engine.fuzzy_search(&bank, kind, query, threshold)
    }

    pub async fn upsert_entity(&self, entity: MemoryEntity) -> Result<()> {
        let mut bank = self.bank.write().await;
        bank.upsert_entity(entity)?;
        self.store.save(&bank)
    }

    pub async fn upsert_connection(&self, conn: Connection) -> Result<()> {
        let mut bank = self.bank.write().await;
        bank.upsert_connection(conn, self.directed)?;
        self.store.save(&bank)
    }

    /// Merge a fragment and flush; returns what was actually added
    pub async fn merge_fragment(&self, fragment: &MemoryFragment) -> Result<MergeReport> {
        let mut bank = self.bank.write().await;
        let report = merge::merge(&mut bank, fragment, self.directed)?;
        if !report.is_empty() {
            self.store.save(&bank)?;
        }
        Ok(report)
    }

    pub async fn reinforce(&self, id: &str, difficulty: f32) -> Result<f32> {
        let mut bank = self.bank.write().await;
        let updated = self.engine.reinforce(&mut bank, id, difficulty)?;
        self.store.save(&bank)?;
        Ok(updated)
    }

    pub async fn decay(&self, id: &str) -> Result<f32> {
        let mut bank = self.bank.write().await;
        let updated = self.engine.decay(&mut bank, id)?;
        self.store.save(&bank)?;
        Ok(updated)
    }
}
