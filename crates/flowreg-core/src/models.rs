//! Core data models for flowreg.
//!
//! These types are shared across all flowreg crates and represent the
//! registry's domain entities, the revision token guarding their mutation,
//! and the request shapes accepted by the mutation coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// REVISION TYPES
// =============================================================================

/// Optimistic-concurrency token guarding mutation of one entity.
///
/// `version` only ever moves forward, one step per successful mutation. It is
/// unrelated to [`SnapshotVersion`], which numbers the immutable snapshots of
/// a flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub entity_id: String,
    pub version: u64,
    pub client_id: String,
}

impl Revision {
    pub fn new(entity_id: impl Into<String>, version: u64, client_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            version,
            client_id: client_id.into(),
        }
    }

    /// Revision a newly created entity starts at.
    pub fn initial(entity_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(entity_id, defaults::INITIAL_REVISION_VERSION, client_id)
    }

    /// The revision that follows this one when `client_id` commits a mutation.
    pub fn next(&self, client_id: impl Into<String>) -> Self {
        Self::new(self.entity_id.clone(), self.version + 1, client_id)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.entity_id, self.version, self.client_id)
    }
}

/// Who last changed an entity, and the revision that change produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityModification {
    revision: Revision,
    last_modifier: String,
}

impl EntityModification {
    pub fn new(revision: Revision, last_modifier: impl Into<String>) -> Self {
        Self {
            revision,
            last_modifier: last_modifier.into(),
        }
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn last_modifier(&self) -> &str {
        &self.last_modifier
    }
}

/// An entity read together with its current revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Revisioned<T> {
    pub entity: T,
    pub revision: Revision,
}

/// The outcome of a successful create or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Modified<T> {
    pub entity: T,
    pub modification: EntityModification,
}

impl<T> Modified<T> {
    pub fn revision(&self) -> &Revision {
        self.modification.revision()
    }
}

// =============================================================================
// BUCKET TYPES
// =============================================================================

/// A namespace grouping flows and extension bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub identifier: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub allow_bundle_redeploy: bool,
    #[serde(default)]
    pub allow_public_read: bool,
}

// =============================================================================
// FLOW TYPES
// =============================================================================

/// A named, versioned dataflow living in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedFlow {
    pub identifier: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub bucket_identifier: Uuid,
    pub created_timestamp: DateTime<Utc>,
    pub modified_timestamp: DateTime<Utc>,
    pub version_count: u32,
}

/// Sequence number of an immutable flow snapshot (1, 2, 3, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotVersion(pub u32);

impl SnapshotVersion {
    pub fn first() -> Self {
        Self(defaults::FIRST_SNAPSHOT_VERSION)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata describing one stored snapshot of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshotMetadata {
    pub bucket_identifier: Uuid,
    pub flow_identifier: Uuid,
    pub version: SnapshotVersion,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// One immutable version of a flow's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    pub snapshot_metadata: FlowSnapshotMetadata,
    pub flow_contents: VersionedProcessGroup,
    #[serde(default)]
    pub parameter_contexts: BTreeMap<String, VersionedParameterContext>,
}

/// A process group and everything nested inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedProcessGroup {
    pub identifier: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default)]
    pub processors: Vec<VersionedProcessor>,
    #[serde(default)]
    pub process_groups: Vec<VersionedProcessGroup>,
    #[serde(default)]
    pub connections: Vec<VersionedConnection>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedProcessor {
    pub identifier: String,
    pub name: String,
    #[serde(rename = "type")]
    pub processor_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_period: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedConnection {
    pub identifier: String,
    pub source_id: String,
    pub destination_id: String,
    #[serde(default)]
    pub selected_relationships: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedParameterContext {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<VersionedParameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

// =============================================================================
// EXTENSION BUNDLE TYPES
// =============================================================================

/// Packaging format of an extension bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    NifiNar,
    MinifiCpp,
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NifiNar => write!(f, "nifi-nar"),
            Self::MinifiCpp => write!(f, "minifi-cpp"),
        }
    }
}

/// An extension bundle (group + artifact) living in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionBundle {
    pub identifier: Uuid,
    pub bucket_identifier: Uuid,
    pub bundle_type: BundleType,
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_timestamp: DateTime<Utc>,
    pub modified_timestamp: DateTime<Utc>,
    pub version_count: u32,
}

/// Metadata for one uploaded version of an extension bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleVersionMetadata {
    pub bundle_identifier: Uuid,
    pub version: String,
    pub sha256: String,
    pub content_size: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Request for creating a bucket.
#[derive(Debug, Clone, Default)]
pub struct CreateBucketRequest {
    /// Caller-chosen id; generated when absent.
    pub identifier: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub allow_bundle_redeploy: bool,
    pub allow_public_read: bool,
}

/// Request for updating a bucket. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateBucketRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub allow_bundle_redeploy: Option<bool>,
    pub allow_public_read: Option<bool>,
}

/// Request for creating a flow.
#[derive(Debug, Clone)]
pub struct CreateFlowRequest {
    pub identifier: Option<Uuid>,
    pub bucket_identifier: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Request for updating a flow. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Request for adding a snapshot to a flow.
#[derive(Debug, Clone)]
pub struct CreateSnapshotRequest {
    pub version: SnapshotVersion,
    pub comments: Option<String>,
    pub flow_contents: VersionedProcessGroup,
    pub parameter_contexts: BTreeMap<String, VersionedParameterContext>,
}

/// Request for creating an extension bundle.
#[derive(Debug, Clone)]
pub struct CreateExtensionBundleRequest {
    pub identifier: Option<Uuid>,
    pub bucket_identifier: Uuid,
    pub bundle_type: BundleType,
    pub group_id: String,
    pub artifact_id: String,
    pub description: Option<String>,
}

/// Request for updating an extension bundle. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateExtensionBundleRequest {
    pub description: Option<String>,
}
