//! # flowreg-core
//!
//! Core types, traits, and abstractions for the flowreg registry.
//!
//! This crate provides the domain model, the collaborator traits the
//! registry is composed from, and the two pieces of logic every mutation
//! goes through: the [`RevisionManager`] (optimistic concurrency) and the
//! [`SerializerRegistry`] (multi-version payload formats).

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod revision;
pub mod serialization;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use revision::RevisionManager;
pub use serialization::{
    flow_snapshot_serializer, FlowSnapshotSerializerV1, FlowSnapshotSerializerV2,
    SerializerRegistry, VersionedSerializer,
};
pub use traits::*;
