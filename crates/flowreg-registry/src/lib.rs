//! # flowreg-registry
//!
//! Service layer of the flowreg registry.
//!
//! This crate provides:
//! - [`RegistryCoordinator`]: revision-checked create/update/delete of
//!   buckets, flows, flow snapshots and extension bundles
//! - [`RegistryConfig`]: environment-driven configuration
//! - [`build_registry`]: explicit wiring of stores, content provider and
//!   serializers
//! - [`telemetry`]: tracing subscriber setup for the `flowreg` binary
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowreg_registry::{build_registry, RegistryConfig};
//!
//! let registry = build_registry(&RegistryConfig::from_env()?).await?;
//! let bucket = registry
//!     .create_bucket(request, &Revision::initial("", "client-1"), "alice")
//!     .await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod factory;
pub mod telemetry;

pub use config::{PersistenceBackend, RegistryConfig};
pub use coordinator::RegistryCoordinator;
pub use factory::{build_persistence_provider, build_registry, build_registry_with};
