//! In-memory metadata store for buckets, flows, snapshots and bundles.
//!
//! Foreign keys are enforced on insert: a flow or bundle needs its bucket, a
//! snapshot record needs its flow, a bundle version needs its bundle.
//! Deletes do not cascade; the coordinator removes children first, and a
//! bucket that still holds flows or bundles refuses to go.
//!
//! Names compare by their Unicode lowercase form, for both uniqueness and
//! ordering.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::trace;
use uuid::Uuid;

use flowreg_core::{
    Bucket, BundleVersionMetadata, Error, ExtensionBundle, FlowSnapshotMetadata, MetadataStore,
    Result, SnapshotVersion, VersionedFlow,
};

#[derive(Debug, Default)]
struct Tables {
    buckets: HashMap<Uuid, Bucket>,
    flows: HashMap<Uuid, VersionedFlow>,
    snapshots: HashMap<Uuid, BTreeMap<SnapshotVersion, FlowSnapshotMetadata>>,
    bundles: HashMap<Uuid, ExtensionBundle>,
    bundle_versions: HashMap<Uuid, Vec<BundleVersionMetadata>>,
}

/// Metadata records held in process-local tables.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    tables: RwLock<Tables>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::Internal("Lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::Internal("Lock poisoned".into()))
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    // ---- buckets ----

    async fn insert_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut tables = self.write()?;
        if tables.buckets.contains_key(&bucket.identifier) {
            return Err(Error::AlreadyExists(format!(
                "bucket {}",
                bucket.identifier
            )));
        }
        trace!(bucket_id = %bucket.identifier, "metadata: insert bucket");
        tables.buckets.insert(bucket.identifier, bucket.clone());
        Ok(())
    }

    async fn fetch_bucket(&self, id: Uuid) -> Result<Option<Bucket>> {
        Ok(self.read()?.buckets.get(&id).cloned())
    }

    async fn fetch_bucket_by_name(&self, name: &str) -> Result<Option<Bucket>> {
        Ok(self
            .read()?
            .buckets
            .values()
            .find(|b| same_name(&b.name, name))
            .cloned())
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let mut buckets: Vec<Bucket> = self.read()?.buckets.values().cloned().collect();
        buckets.sort_by_cached_key(|b| fold_name(&b.name));
        Ok(buckets)
    }

    async fn update_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut tables = self.write()?;
        let slot = tables
            .buckets
            .get_mut(&bucket.identifier)
            .ok_or_else(|| Error::NotFound(format!("bucket {}", bucket.identifier)))?;
        *slot = bucket.clone();
        Ok(())
    }

    async fn delete_bucket(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.write()?;
        let flows = tables
            .flows
            .values()
            .filter(|f| f.bucket_identifier == id)
            .count();
        let bundles = tables
            .bundles
            .values()
            .filter(|b| b.bucket_identifier == id)
            .count();
        if flows + bundles > 0 {
            return Err(Error::InvalidInput(format!(
                "bucket {} still holds {} flows and {} bundles",
                id, flows, bundles
            )));
        }
        Ok(tables.buckets.remove(&id).is_some())
    }

    // ---- flows ----

    async fn insert_flow(&self, flow: &VersionedFlow) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.buckets.contains_key(&flow.bucket_identifier) {
            return Err(Error::NotFound(format!(
                "bucket {}",
                flow.bucket_identifier
            )));
        }
        if tables.flows.contains_key(&flow.identifier) {
            return Err(Error::AlreadyExists(format!("flow {}", flow.identifier)));
        }
        trace!(flow_id = %flow.identifier, bucket_id = %flow.bucket_identifier, "metadata: insert flow");
        tables.flows.insert(flow.identifier, flow.clone());
        Ok(())
    }

    async fn fetch_flow(&self, id: Uuid) -> Result<Option<VersionedFlow>> {
        Ok(self.read()?.flows.get(&id).cloned())
    }

    async fn fetch_flow_by_name(
        &self,
        bucket_id: Uuid,
        name: &str,
    ) -> Result<Option<VersionedFlow>> {
        Ok(self
            .read()?
            .flows
            .values()
            .find(|f| f.bucket_identifier == bucket_id && same_name(&f.name, name))
            .cloned())
    }

    async fn list_flows(&self, bucket_id: Uuid) -> Result<Vec<VersionedFlow>> {
        let mut flows: Vec<VersionedFlow> = self
            .read()?
            .flows
            .values()
            .filter(|f| f.bucket_identifier == bucket_id)
            .cloned()
            .collect();
        flows.sort_by_cached_key(|f| fold_name(&f.name));
        Ok(flows)
    }

    async fn update_flow(&self, flow: &VersionedFlow) -> Result<()> {
        let mut tables = self.write()?;
        let slot = tables
            .flows
            .get_mut(&flow.identifier)
            .ok_or_else(|| Error::NotFound(format!("flow {}", flow.identifier)))?;
        *slot = flow.clone();
        Ok(())
    }

    async fn delete_flow(&self, id: Uuid) -> Result<bool> {
        Ok(self.write()?.flows.remove(&id).is_some())
    }

    // ---- flow snapshots ----

    async fn insert_snapshot_metadata(&self, metadata: &FlowSnapshotMetadata) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.flows.contains_key(&metadata.flow_identifier) {
            return Err(Error::NotFound(format!(
                "flow {}",
                metadata.flow_identifier
            )));
        }
        let versions = tables.snapshots.entry(metadata.flow_identifier).or_default();
        if versions.contains_key(&metadata.version) {
            return Err(Error::AlreadyExists(format!(
                "snapshot {} of flow {}",
                metadata.version, metadata.flow_identifier
            )));
        }
        versions.insert(metadata.version, metadata.clone());
        Ok(())
    }

    async fn fetch_snapshot_metadata(
        &self,
        flow_id: Uuid,
        version: SnapshotVersion,
    ) -> Result<Option<FlowSnapshotMetadata>> {
        Ok(self
            .read()?
            .snapshots
            .get(&flow_id)
            .and_then(|v| v.get(&version))
            .cloned())
    }

    async fn latest_snapshot_metadata(
        &self,
        flow_id: Uuid,
    ) -> Result<Option<FlowSnapshotMetadata>> {
        Ok(self
            .read()?
            .snapshots
            .get(&flow_id)
            .and_then(|v| v.values().next_back())
            .cloned())
    }

    async fn list_snapshot_metadata(&self, flow_id: Uuid) -> Result<Vec<FlowSnapshotMetadata>> {
        Ok(self
            .read()?
            .snapshots
            .get(&flow_id)
            .map(|v| v.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_snapshot_version(
        &self,
        flow_id: Uuid,
        version: SnapshotVersion,
    ) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(versions) = tables.snapshots.get_mut(&flow_id) else {
            return Ok(false);
        };
        let removed = versions.remove(&version).is_some();
        if versions.is_empty() {
            tables.snapshots.remove(&flow_id);
        }
        Ok(removed)
    }

    async fn delete_snapshot_metadata(&self, flow_id: Uuid) -> Result<usize> {
        Ok(self
            .write()?
            .snapshots
            .remove(&flow_id)
            .map(|v| v.len())
            .unwrap_or(0))
    }

    // ---- extension bundles ----

    async fn insert_bundle(&self, bundle: &ExtensionBundle) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.buckets.contains_key(&bundle.bucket_identifier) {
            return Err(Error::NotFound(format!(
                "bucket {}",
                bundle.bucket_identifier
            )));
        }
        if tables.bundles.contains_key(&bundle.identifier) {
            return Err(Error::AlreadyExists(format!(
                "bundle {}",
                bundle.identifier
            )));
        }
        tables.bundles.insert(bundle.identifier, bundle.clone());
        Ok(())
    }

    async fn fetch_bundle(&self, id: Uuid) -> Result<Option<ExtensionBundle>> {
        Ok(self.read()?.bundles.get(&id).cloned())
    }

    async fn fetch_bundle_by_coordinate(
        &self,
        bucket_id: Uuid,
        group_id: &str,
        artifact_id: &str,
    ) -> Result<Option<ExtensionBundle>> {
        Ok(self
            .read()?
            .bundles
            .values()
            .find(|b| {
                b.bucket_identifier == bucket_id
                    && b.group_id == group_id
                    && b.artifact_id == artifact_id
            })
            .cloned())
    }

    async fn list_bundles(&self, bucket_id: Uuid) -> Result<Vec<ExtensionBundle>> {
        let mut bundles: Vec<ExtensionBundle> = self
            .read()?
            .bundles
            .values()
            .filter(|b| b.bucket_identifier == bucket_id)
            .cloned()
            .collect();
        bundles.sort_by(|a, b| {
            a.group_id
                .cmp(&b.group_id)
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        Ok(bundles)
    }

    async fn update_bundle(&self, bundle: &ExtensionBundle) -> Result<()> {
        let mut tables = self.write()?;
        let slot = tables
            .bundles
            .get_mut(&bundle.identifier)
            .ok_or_else(|| Error::NotFound(format!("bundle {}", bundle.identifier)))?;
        *slot = bundle.clone();
        Ok(())
    }

    async fn delete_bundle(&self, id: Uuid) -> Result<bool> {
        Ok(self.write()?.bundles.remove(&id).is_some())
    }

    async fn put_bundle_version(&self, metadata: &BundleVersionMetadata) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.bundles.contains_key(&metadata.bundle_identifier) {
            return Err(Error::NotFound(format!(
                "bundle {}",
                metadata.bundle_identifier
            )));
        }
        let versions = tables
            .bundle_versions
            .entry(metadata.bundle_identifier)
            .or_default();
        match versions.iter_mut().find(|v| v.version == metadata.version) {
            Some(existing) => *existing = metadata.clone(),
            None => versions.push(metadata.clone()),
        }
        Ok(())
    }

    async fn fetch_bundle_version(
        &self,
        bundle_id: Uuid,
        version: &str,
    ) -> Result<Option<BundleVersionMetadata>> {
        Ok(self
            .read()?
            .bundle_versions
            .get(&bundle_id)
            .and_then(|v| v.iter().find(|m| m.version == version))
            .cloned())
    }

    async fn list_bundle_versions(&self, bundle_id: Uuid) -> Result<Vec<BundleVersionMetadata>> {
        Ok(self
            .read()?
            .bundle_versions
            .get(&bundle_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_bundle_version(&self, bundle_id: Uuid, version: &str) -> Result<bool> {
        let mut tables = self.write()?;
        let Some(versions) = tables.bundle_versions.get_mut(&bundle_id) else {
            return Ok(false);
        };
        let before = versions.len();
        versions.retain(|v| v.version != version);
        let removed = versions.len() != before;
        if versions.is_empty() {
            tables.bundle_versions.remove(&bundle_id);
        }
        Ok(removed)
    }

    async fn delete_bundle_versions(&self, bundle_id: Uuid) -> Result<usize> {
        Ok(self
            .write()?
            .bundle_versions
            .remove(&bundle_id)
            .map(|v| v.len())
            .unwrap_or(0))
    }
}

fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

fn same_name(a: &str, b: &str) -> bool {
    fold_name(a) == fold_name(b)
}
