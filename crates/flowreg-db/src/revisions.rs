//! In-memory revision store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::trace;

use flowreg_core::{Error, Result, Revision, RevisionStore};

/// Revision records held in a process-local map.
///
/// `put_revision` checks the expected version and writes under one write
/// lock, so it is a true compare-and-set even without the revision manager's
/// entity locks.
#[derive(Debug, Default)]
pub struct MemoryRevisionStore {
    revisions: RwLock<HashMap<String, Revision>>,
}

impl MemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of revisioned entities.
    pub fn len(&self) -> usize {
        self.revisions.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Internal("Lock poisoned".into())
}

#[async_trait]
impl RevisionStore for MemoryRevisionStore {
    async fn get_revision(&self, entity_id: &str) -> Result<Option<Revision>> {
        let revisions = self.revisions.read().map_err(poisoned)?;
        Ok(revisions.get(entity_id).cloned())
    }

    async fn create_revision(&self, revision: Revision) -> Result<()> {
        let mut revisions = self.revisions.write().map_err(poisoned)?;
        if revisions.contains_key(&revision.entity_id) {
            return Err(Error::AlreadyExists(format!(
                "revision for entity {}",
                revision.entity_id
            )));
        }
        trace!(entity_id = %revision.entity_id, "revisions: create");
        revisions.insert(revision.entity_id.clone(), revision);
        Ok(())
    }

    async fn put_revision(&self, expected_version: u64, revision: Revision) -> Result<()> {
        let mut revisions = self.revisions.write().map_err(poisoned)?;
        let stored = revisions.get(&revision.entity_id).ok_or_else(|| {
            Error::NotFound(format!("revision for entity {}", revision.entity_id))
        })?;

        if stored.version != expected_version {
            return Err(Error::StaleRevision {
                entity_id: revision.entity_id.clone(),
                claimed: expected_version,
                current: stored.version,
            });
        }

        trace!(
            entity_id = %revision.entity_id,
            new_version = revision.version,
            "revisions: put"
        );
        revisions.insert(revision.entity_id.clone(), revision);
        Ok(())
    }

    async fn delete_revision(&self, entity_id: &str) -> Result<bool> {
        let mut revisions = self.revisions.write().map_err(poisoned)?;
        Ok(revisions.remove(entity_id).is_some())
    }

    async fn list_revisions(&self) -> Result<Vec<Revision>> {
        let revisions = self.revisions.read().map_err(poisoned)?;
        let mut all: Vec<Revision> = revisions.values().cloned().collect();
        all.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(all)
    }
}
