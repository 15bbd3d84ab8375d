//! Revision manager: optimistic concurrency control for registry entities.
//!
//! Every mutation presents the revision the caller last read. The manager
//! compares it with the stored revision and, only if they match, runs the
//! mutation and advances the stored version by exactly one.
//!
//! Linearizability per entity comes from two layers:
//! - an async mutex per entity id held from the revision load until the
//!   conditional put, so same-entity claims queue while unrelated entities
//!   proceed in parallel;
//! - the store's `put_revision`, which is itself conditional on the expected
//!   version, so a second manager over the same store cannot double-advance.
//!
//! The mutation runs before the revision is written. A mutation error leaves
//! the revision untouched; a dropped future releases the entity lock without
//! writing anything.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::models::Revision;
use crate::traits::RevisionStore;

type LockTable = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Exclusive hold on one entity id. Releasing it prunes the table entry once
/// no other task references it.
struct EntityLock<'a> {
    table: &'a LockTable,
    entity_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntityLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mutex) = table.get(&self.entity_id) {
            if Arc::strong_count(mutex) == 1 {
                table.remove(&self.entity_id);
                trace!(
                    subsystem = "core",
                    component = "revision_manager",
                    entity_id = %self.entity_id,
                    "Pruned entity lock"
                );
            }
        }
    }
}

/// Owns the current revision of every revisable entity.
pub struct RevisionManager {
    store: Arc<dyn RevisionStore>,
    locks: LockTable,
}

impl RevisionManager {
    /// Create a revision manager over the given store.
    pub fn new(store: Arc<dyn RevisionStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_entity(&self, entity_id: &str) -> EntityLock<'_> {
        let mutex = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .entry(entity_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        // Build the lock before awaiting so cancellation while queued still prunes.
        let mut lock = EntityLock {
            table: &self.locks,
            entity_id: entity_id.to_string(),
            guard: None,
        };
        lock.guard = Some(mutex.lock_owned().await);
        lock
    }

    /// Number of entity ids with a live lock entry.
    pub fn active_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Current revision of an entity.
    pub async fn get_revision(&self, entity_id: &str) -> Result<Revision> {
        self.store
            .get_revision(entity_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("revision for entity {}", entity_id)))
    }

    /// Whether the entity is under revision control.
    pub async fn is_revisioned(&self, entity_id: &str) -> Result<bool> {
        Ok(self.store.get_revision(entity_id).await?.is_some())
    }

    /// Run `creation` and register the entity at the initial revision.
    ///
    /// The claimed revision must carry the initial version. Fails with
    /// `AlreadyExists` if the entity is already revisioned; in that case, and
    /// when `creation` fails, no revision is registered.
    pub async fn create_revision<T, F, Fut>(
        &self,
        entity_id: &str,
        claimed: &Revision,
        creation: F,
    ) -> Result<(T, Revision)>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        check_entity(entity_id, claimed)?;
        let initial = Revision::initial(entity_id, claimed.client_id.clone());
        if claimed.version != initial.version {
            return Err(Error::InvalidRevision(format!(
                "a revision version of {} must be specified when creating {}, got {}",
                initial.version, entity_id, claimed.version
            )));
        }

        let _lock = self.lock_entity(entity_id).await;

        if self.store.get_revision(entity_id).await?.is_some() {
            return Err(Error::AlreadyExists(format!("entity {}", entity_id)));
        }

        let value = creation().await?;

        self.store
            .create_revision(initial.clone())
            .await
            .inspect_err(|e| {
                error!(
                    subsystem = "core",
                    component = "revision_manager",
                    op = "create_revision",
                    entity_id,
                    error = %e,
                    "Entity created but its revision could not be registered"
                );
            })?;

        debug!(
            subsystem = "core",
            component = "revision_manager",
            op = "create_revision",
            entity_id,
            client_id = %initial.client_id,
            "Registered revision"
        );
        Ok((value, initial))
    }

    /// Validate `claimed` against the stored revision, run `mutation`, and
    /// advance the revision by one.
    ///
    /// Fails with `StaleRevision` (and runs nothing) if the claimed version
    /// differs from the stored one. If `mutation` fails its error is returned
    /// and the stored revision is left unchanged.
    pub async fn update_revision<T, F, Fut>(
        &self,
        entity_id: &str,
        claimed: &Revision,
        mutation: F,
    ) -> Result<(T, Revision)>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        check_entity(entity_id, claimed)?;
        let _lock = self.lock_entity(entity_id).await;

        let current = self.verify_locked(entity_id, claimed).await?;
        let value = mutation().await?;

        let next = current.next(claimed.client_id.clone());
        self.store
            .put_revision(current.version, next.clone())
            .await
            .inspect_err(|e| {
                error!(
                    subsystem = "core",
                    component = "revision_manager",
                    op = "update_revision",
                    entity_id,
                    current_version = current.version,
                    error = %e,
                    "Mutation applied but revision could not be advanced"
                );
            })?;

        info!(
            subsystem = "core",
            component = "revision_manager",
            op = "update_revision",
            entity_id,
            claimed_version = claimed.version,
            new_version = next.version,
            client_id = %next.client_id,
            "Revision advanced"
        );
        Ok((value, next))
    }

    /// Validate `claimed`, run `deletion`, then drop the revision record.
    ///
    /// If `deletion` fails the revision is retained so the delete can be
    /// retried. A failure removing the revision itself is propagated and the
    /// record stays in place.
    pub async fn delete_with_revision<T, F, Fut>(
        &self,
        entity_id: &str,
        claimed: &Revision,
        deletion: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        check_entity(entity_id, claimed)?;
        let _lock = self.lock_entity(entity_id).await;

        self.verify_locked(entity_id, claimed).await?;
        let value = deletion().await?;

        self.store.delete_revision(entity_id).await.inspect_err(|e| {
            warn!(
                subsystem = "core",
                component = "revision_manager",
                op = "delete_revision",
                entity_id,
                error = %e,
                "Content deleted but revision retained; delete can be retried"
            );
        })?;

        debug!(
            subsystem = "core",
            component = "revision_manager",
            op = "delete_revision",
            entity_id,
            "Revision removed"
        );
        Ok(value)
    }

    /// Remove revision tracking for a deleted entity. Idempotent.
    pub async fn delete_revision(&self, entity_id: &str) -> Result<()> {
        let _lock = self.lock_entity(entity_id).await;
        let existed = self.store.delete_revision(entity_id).await?;
        trace!(
            subsystem = "core",
            component = "revision_manager",
            op = "delete_revision",
            entity_id,
            existed,
            "Revision delete"
        );
        Ok(())
    }

    async fn verify_locked(&self, entity_id: &str, claimed: &Revision) -> Result<Revision> {
        let current = self.get_revision(entity_id).await?;
        if current.version != claimed.version {
            warn!(
                subsystem = "core",
                component = "revision_manager",
                entity_id,
                claimed_version = claimed.version,
                current_version = current.version,
                client_id = %claimed.client_id,
                "Stale revision rejected"
            );
            return Err(Error::StaleRevision {
                entity_id: entity_id.to_string(),
                claimed: claimed.version,
                current: current.version,
            });
        }
        Ok(current)
    }
}

fn check_entity(entity_id: &str, claimed: &Revision) -> Result<()> {
    if claimed.entity_id != entity_id {
        return Err(Error::InvalidRevision(format!(
            "revision for {} presented for {}",
            claimed.entity_id, entity_id
        )));
    }
    Ok(())
}
