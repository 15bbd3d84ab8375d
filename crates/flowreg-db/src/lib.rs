//! # flowreg-db
//!
//! Storage layer for the flowreg registry.
//!
//! This crate provides:
//! - In-memory metadata store for buckets, flows, snapshots and bundles
//! - In-memory revision store with conditional (compare-and-set) puts
//! - Filesystem and in-memory content persistence providers
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowreg_db::{Database, FilesystemPersistenceProvider};
//!
//! let db = Database::in_memory();
//! let content = FilesystemPersistenceProvider::new("./flow_storage");
//! content.validate().await?;
//! ```
pub mod file_storage;
pub mod metadata;
pub mod revisions;

// Always compiled so integration tests (in tests/) can share the builders.
pub mod test_fixtures;

// Re-export core types
pub use flowreg_core::*;

pub use file_storage::{FilesystemPersistenceProvider, MemoryPersistenceProvider};
pub use metadata::MemoryMetadataStore;
pub use revisions::MemoryRevisionStore;

use std::sync::Arc;

/// Combined storage context: metadata records plus revision records.
#[derive(Clone)]
pub struct Database {
    /// Bucket, flow, snapshot and bundle records.
    pub metadata: Arc<dyn MetadataStore>,
    /// Revision records guarded by the revision manager.
    pub revisions: Arc<dyn RevisionStore>,
}

impl Database {
    /// Create a Database from explicit store implementations.
    pub fn new(metadata: Arc<dyn MetadataStore>, revisions: Arc<dyn RevisionStore>) -> Self {
        Self {
            metadata,
            revisions,
        }
    }

    /// Create a Database backed by process-local tables.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryRevisionStore::new()),
        )
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
