//! Core traits for flowreg collaborators.
//!
//! These traits define the narrow interfaces the revision manager and the
//! mutation coordinator consume, enabling pluggable backends and testability.
//! Implementations never enforce revisions themselves except for the
//! conditional [`RevisionStore::put_revision`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REVISION STORE
// =============================================================================

/// Durable storage for one revision record per entity id.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    /// Fetch the stored revision, `None` if the entity is not revisioned.
    async fn get_revision(&self, entity_id: &str) -> Result<Option<Revision>>;

    /// Register a revision for a new entity.
    ///
    /// Fails with `AlreadyExists` if the entity already has one.
    async fn create_revision(&self, revision: Revision) -> Result<()>;

    /// Replace the stored revision only if its version still equals
    /// `expected_version`.
    ///
    /// Fails with `NotFound` when no revision is stored and `StaleRevision`
    /// when the stored version differs.
    async fn put_revision(&self, expected_version: u64, revision: Revision) -> Result<()>;

    /// Remove the revision. Returns true if one existed.
    async fn delete_revision(&self, entity_id: &str) -> Result<bool>;

    /// List every stored revision.
    async fn list_revisions(&self) -> Result<Vec<Revision>>;
}

// =============================================================================
// METADATA STORE
// =============================================================================

/// Durable structured storage for bucket, flow and bundle records.
///
/// Writes are unconditional; callers serialize them through the revision
/// manager.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // ---- buckets ----

    async fn insert_bucket(&self, bucket: &Bucket) -> Result<()>;

    async fn fetch_bucket(&self, id: Uuid) -> Result<Option<Bucket>>;

    /// Case-insensitive lookup by name.
    async fn fetch_bucket_by_name(&self, name: &str) -> Result<Option<Bucket>>;

    /// All buckets ordered by name.
    async fn list_buckets(&self) -> Result<Vec<Bucket>>;

    async fn update_bucket(&self, bucket: &Bucket) -> Result<()>;

    /// Returns true if the bucket existed. Fails with `InvalidInput` while
    /// flows or bundles still belong to it.
    async fn delete_bucket(&self, id: Uuid) -> Result<bool>;

    // ---- flows ----

    async fn insert_flow(&self, flow: &VersionedFlow) -> Result<()>;

    async fn fetch_flow(&self, id: Uuid) -> Result<Option<VersionedFlow>>;

    /// Case-insensitive lookup by name within a bucket.
    async fn fetch_flow_by_name(&self, bucket_id: Uuid, name: &str)
        -> Result<Option<VersionedFlow>>;

    /// Flows of a bucket ordered by name.
    async fn list_flows(&self, bucket_id: Uuid) -> Result<Vec<VersionedFlow>>;

    async fn update_flow(&self, flow: &VersionedFlow) -> Result<()>;

    /// Returns true if the flow existed.
    async fn delete_flow(&self, id: Uuid) -> Result<bool>;

    // ---- flow snapshots ----

    async fn insert_snapshot_metadata(&self, metadata: &FlowSnapshotMetadata) -> Result<()>;

    async fn fetch_snapshot_metadata(
        &self,
        flow_id: Uuid,
        version: SnapshotVersion,
    ) -> Result<Option<FlowSnapshotMetadata>>;

    async fn latest_snapshot_metadata(&self, flow_id: Uuid)
        -> Result<Option<FlowSnapshotMetadata>>;

    /// Snapshot metadata of a flow in ascending version order.
    async fn list_snapshot_metadata(&self, flow_id: Uuid) -> Result<Vec<FlowSnapshotMetadata>>;

    /// Remove one snapshot record. Returns true if it existed.
    async fn delete_snapshot_version(&self, flow_id: Uuid, version: SnapshotVersion)
        -> Result<bool>;

    /// Remove every snapshot record of a flow. Returns the number removed.
    async fn delete_snapshot_metadata(&self, flow_id: Uuid) -> Result<usize>;

    // ---- extension bundles ----

    async fn insert_bundle(&self, bundle: &ExtensionBundle) -> Result<()>;

    async fn fetch_bundle(&self, id: Uuid) -> Result<Option<ExtensionBundle>>;

    /// Lookup by (bucket, group, artifact) coordinate.
    async fn fetch_bundle_by_coordinate(
        &self,
        bucket_id: Uuid,
        group_id: &str,
        artifact_id: &str,
    ) -> Result<Option<ExtensionBundle>>;

    /// Bundles of a bucket ordered by group then artifact.
    async fn list_bundles(&self, bucket_id: Uuid) -> Result<Vec<ExtensionBundle>>;

    async fn update_bundle(&self, bundle: &ExtensionBundle) -> Result<()>;

    /// Returns true if the bundle existed.
    async fn delete_bundle(&self, id: Uuid) -> Result<bool>;

    /// Insert or replace the metadata of one bundle version.
    async fn put_bundle_version(&self, metadata: &BundleVersionMetadata) -> Result<()>;

    async fn fetch_bundle_version(
        &self,
        bundle_id: Uuid,
        version: &str,
    ) -> Result<Option<BundleVersionMetadata>>;

    /// Versions of a bundle in upload order.
    async fn list_bundle_versions(&self, bundle_id: Uuid) -> Result<Vec<BundleVersionMetadata>>;

    /// Remove one version record. Returns true if it existed.
    async fn delete_bundle_version(&self, bundle_id: Uuid, version: &str) -> Result<bool>;

    /// Remove every version record of a bundle. Returns the number removed.
    async fn delete_bundle_versions(&self, bundle_id: Uuid) -> Result<usize>;
}

// =============================================================================
// PERSISTENCE PROVIDER
// =============================================================================

/// Durable byte-oriented storage for flow snapshot and bundle content.
///
/// Content is keyed by entity id plus a logical content version (a snapshot
/// sequence number or a bundle version string). Blobs are immutable once
/// written except for explicit redeploys.
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Short name used in logs and configuration ("filesystem", "memory").
    fn provider_name(&self) -> &'static str;

    async fn save_content(&self, entity_id: &str, version: &str, data: &[u8]) -> Result<()>;

    /// Fails with `NotFound` if no content is stored under the key.
    async fn get_content(&self, entity_id: &str, version: &str) -> Result<Vec<u8>>;

    /// Deleting content that is already absent is not an error.
    async fn delete_content(&self, entity_id: &str, version: &str) -> Result<()>;

    /// Delete every content version of an entity. Absent entities are not an error.
    async fn delete_all_content(&self, entity_id: &str) -> Result<()>;

    /// Content versions stored for an entity, sorted.
    async fn list_content_versions(&self, entity_id: &str) -> Result<Vec<String>>;
}
