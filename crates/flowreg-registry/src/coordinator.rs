//! Entity mutation coordinator.
//!
//! Every create, update and delete of a bucket, flow or extension bundle
//! passes through the [`RevisionManager`]: the caller presents the revision
//! it last saw, the coordinator performs the storage work inside the
//! manager's guarded closure, and only then is the revision advanced.
//!
//! Ordering on delete is content, then metadata, then revision. A failure
//! part-way leaves the revision in place so the caller can retry, and
//! content removal tolerates content that is already gone. A mutation that
//! fails after writing content undoes its own writes before returning.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use flowreg_core::defaults::{BUCKET_DELETE_PASSES, MAX_DESCRIPTION_LEN, MAX_NAME_LEN};
use flowreg_core::{
    Bucket, BundleVersionMetadata, CreateBucketRequest, CreateExtensionBundleRequest,
    CreateFlowRequest, CreateSnapshotRequest, EntityModification, Error, ExtensionBundle,
    FlowSnapshot, FlowSnapshotMetadata, MetadataStore, Modified, PersistenceProvider, Result,
    Revision, RevisionManager, Revisioned, SerializerRegistry, SnapshotVersion,
    UpdateBucketRequest, UpdateExtensionBundleRequest, UpdateFlowRequest, VersionedFlow,
};

/// Coordinates revision-checked mutation of registry entities.
pub struct RegistryCoordinator {
    metadata: Arc<dyn MetadataStore>,
    revisions: RevisionManager,
    content: Arc<dyn PersistenceProvider>,
    flow_serializer: SerializerRegistry<FlowSnapshot>,
}

impl RegistryCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        revisions: RevisionManager,
        content: Arc<dyn PersistenceProvider>,
        flow_serializer: SerializerRegistry<FlowSnapshot>,
    ) -> Self {
        Self {
            metadata,
            revisions,
            content,
            flow_serializer,
        }
    }

    pub fn revisions(&self) -> &RevisionManager {
        &self.revisions
    }

    pub fn flow_serializer(&self) -> &SerializerRegistry<FlowSnapshot> {
        &self.flow_serializer
    }

    pub fn provider_name(&self) -> &'static str {
        self.content.provider_name()
    }

    // =========================================================================
    // BUCKETS
    // =========================================================================

    /// Create a bucket. Names are unique ignoring case.
    pub async fn create_bucket(
        &self,
        request: CreateBucketRequest,
        claimed: &Revision,
        user: &str,
    ) -> Result<Modified<Bucket>> {
        validate_name("bucket", &request.name)?;
        validate_description(request.description.as_deref())?;

        let id = request.identifier.unwrap_or_else(Uuid::new_v4);
        let entity_id = id.to_string();
        let claimed = bind_claim(&entity_id, claimed)?;

        let bucket = Bucket {
            identifier: id,
            name: request.name.trim().to_string(),
            description: request.description,
            created_timestamp: Utc::now(),
            allow_bundle_redeploy: request.allow_bundle_redeploy,
            allow_public_read: request.allow_public_read,
        };

        let metadata = &self.metadata;
        let new_bucket = &bucket;
        let ((), revision) = self
            .revisions
            .create_revision(&entity_id, &claimed, move || async move {
                if metadata.fetch_bucket_by_name(&new_bucket.name).await?.is_some() {
                    return Err(Error::AlreadyExists(format!(
                        "a bucket named '{}' already exists",
                        new_bucket.name
                    )));
                }
                metadata.insert_bucket(new_bucket).await
            })
            .await?;

        log_mutation("create_bucket", &revision, user);
        Ok(modified(bucket, revision, user))
    }

    pub async fn get_bucket(&self, id: Uuid) -> Result<Revisioned<Bucket>> {
        let bucket = self.require_bucket(id).await?;
        let revision = self.revisions.get_revision(&id.to_string()).await?;
        Ok(Revisioned {
            entity: bucket,
            revision,
        })
    }

    /// All buckets ordered by name.
    pub async fn list_buckets(&self) -> Result<Vec<Revisioned<Bucket>>> {
        let buckets = self.metadata.list_buckets().await?;
        let mut out = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let revision = self
                .revisions
                .get_revision(&bucket.identifier.to_string())
                .await?;
            out.push(Revisioned {
                entity: bucket,
                revision,
            });
        }
        Ok(out)
    }

    pub async fn update_bucket(
        &self,
        id: Uuid,
        claimed: &Revision,
        request: UpdateBucketRequest,
        user: &str,
    ) -> Result<Modified<Bucket>> {
        if let Some(name) = &request.name {
            validate_name("bucket", name)?;
        }
        validate_description(request.description.as_deref())?;

        let metadata = &self.metadata;
        let (bucket, revision) = self
            .revisions
            .update_revision(&id.to_string(), claimed, move || async move {
                let mut bucket = metadata
                    .fetch_bucket(id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("bucket {}", id)))?;

                if let Some(name) = request.name {
                    let name = name.trim().to_string();
                    if let Some(other) = metadata.fetch_bucket_by_name(&name).await? {
                        if other.identifier != id {
                            return Err(Error::AlreadyExists(format!(
                                "a bucket named '{}' already exists",
                                name
                            )));
                        }
                    }
                    bucket.name = name;
                }
                if let Some(description) = request.description {
                    bucket.description = Some(description);
                }
                if let Some(allow) = request.allow_bundle_redeploy {
                    bucket.allow_bundle_redeploy = allow;
                }
                if let Some(allow) = request.allow_public_read {
                    bucket.allow_public_read = allow;
                }

                metadata.update_bucket(&bucket).await?;
                Ok(bucket)
            })
            .await?;

        log_mutation("update_bucket", &revision, user);
        Ok(modified(bucket, revision, user))
    }

    /// Delete a bucket together with every flow and bundle it holds.
    ///
    /// Returns the deleted bucket, or `None` when a previous attempt already
    /// removed its metadata and only the revision was left behind.
    pub async fn delete_bucket(
        &self,
        id: Uuid,
        claimed: &Revision,
        user: &str,
    ) -> Result<Option<Bucket>> {
        let entity_id = id.to_string();
        let bucket = self
            .revisions
            .delete_with_revision(&entity_id, claimed, || async {
                let bucket = self.metadata.fetch_bucket(id).await?;
                self.purge_bucket(id).await?;
                Ok(bucket)
            })
            .await?;

        info!(
            subsystem = "registry",
            component = "coordinator",
            op = "delete_bucket",
            entity_id = %entity_id,
            user,
            "Bucket deleted"
        );
        Ok(bucket)
    }

    /// Remove every flow and bundle of a bucket, then the bucket record.
    ///
    /// A child created after the listing makes the store refuse the bucket
    /// delete; the children are then listed again.
    async fn purge_bucket(&self, id: Uuid) -> Result<()> {
        let mut pass = 1;
        loop {
            for flow in self.metadata.list_flows(id).await? {
                let flow_id = flow.identifier;
                self.delete_child(&flow_id.to_string(), || self.purge_flow_content(flow_id))
                    .await?;
                self.metadata.delete_flow(flow_id).await?;
            }
            for bundle in self.metadata.list_bundles(id).await? {
                let bundle_id = bundle.identifier;
                self.delete_child(&bundle_id.to_string(), || {
                    self.purge_bundle_content(bundle_id)
                })
                .await?;
                self.metadata.delete_bundle(bundle_id).await?;
            }

            match self.metadata.delete_bucket(id).await {
                Ok(_) => return Ok(()),
                Err(Error::InvalidInput(reason)) if pass < BUCKET_DELETE_PASSES => {
                    debug!(
                        subsystem = "registry",
                        component = "coordinator",
                        op = "delete_bucket",
                        bucket_id = %id,
                        pass,
                        reason = %reason,
                        "Bucket gained children during delete, listing again"
                    );
                    pass += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Purge a bucket child's stored data and drop its revision while holding
    /// the child's lock. The caller removes the child record afterwards, so a
    /// failed attempt leaves the child listable for the retry.
    async fn delete_child<F, Fut>(&self, entity_id: &str, purge: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<()>> + Send,
    {
        loop {
            let current = match self.revisions.get_revision(entity_id).await {
                Ok(revision) => revision,
                Err(Error::NotFound(_)) => {
                    // Creation in flight or revision already dropped
                    purge().await?;
                    return self.revisions.delete_revision(entity_id).await;
                }
                Err(e) => return Err(e),
            };
            match self
                .revisions
                .delete_with_revision(entity_id, &current, || purge())
                .await
            {
                Err(Error::StaleRevision { .. }) => continue,
                other => return other,
            }
        }
    }

    // =========================================================================
    // FLOWS
    // =========================================================================

    /// Create a flow. Names are unique within a bucket, ignoring case.
    pub async fn create_flow(
        &self,
        request: CreateFlowRequest,
        claimed: &Revision,
        user: &str,
    ) -> Result<Modified<VersionedFlow>> {
        validate_name("flow", &request.name)?;
        validate_description(request.description.as_deref())?;

        let id = request.identifier.unwrap_or_else(Uuid::new_v4);
        let entity_id = id.to_string();
        let claimed = bind_claim(&entity_id, claimed)?;

        let now = Utc::now();
        let flow = VersionedFlow {
            identifier: id,
            name: request.name.trim().to_string(),
            description: request.description,
            bucket_identifier: request.bucket_identifier,
            created_timestamp: now,
            modified_timestamp: now,
            version_count: 0,
        };

        let metadata = &self.metadata;
        let new_flow = &flow;
        let ((), revision) = self
            .revisions
            .create_revision(&entity_id, &claimed, move || async move {
                let bucket_id = new_flow.bucket_identifier;
                if metadata.fetch_bucket(bucket_id).await?.is_none() {
                    return Err(Error::NotFound(format!("bucket {}", bucket_id)));
                }
                if metadata
                    .fetch_flow_by_name(bucket_id, &new_flow.name)
                    .await?
                    .is_some()
                {
                    return Err(Error::AlreadyExists(format!(
                        "a flow named '{}' already exists in bucket {}",
                        new_flow.name, bucket_id
                    )));
                }
                metadata.insert_flow(new_flow).await
            })
            .await?;

        log_mutation("create_flow", &revision, user);
        Ok(modified(flow, revision, user))
    }

    pub async fn get_flow(&self, id: Uuid) -> Result<Revisioned<VersionedFlow>> {
        let flow = self.require_flow(id).await?;
        let revision = self.revisions.get_revision(&id.to_string()).await?;
        Ok(Revisioned {
            entity: flow,
            revision,
        })
    }

    pub async fn list_flows(&self, bucket_id: Uuid) -> Result<Vec<Revisioned<VersionedFlow>>> {
        self.require_bucket(bucket_id).await?;
        let flows = self.metadata.list_flows(bucket_id).await?;
        let mut out = Vec::with_capacity(flows.len());
        for flow in flows {
            let revision = self
                .revisions
                .get_revision(&flow.identifier.to_string())
                .await?;
            out.push(Revisioned {
                entity: flow,
                revision,
            });
        }
        Ok(out)
    }

    pub async fn update_flow(
        &self,
        id: Uuid,
        claimed: &Revision,
        request: UpdateFlowRequest,
        user: &str,
    ) -> Result<Modified<VersionedFlow>> {
        if let Some(name) = &request.name {
            validate_name("flow", name)?;
        }
        validate_description(request.description.as_deref())?;

        let metadata = &self.metadata;
        let (flow, revision) = self
            .revisions
            .update_revision(&id.to_string(), claimed, move || async move {
                let mut flow = metadata
                    .fetch_flow(id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("flow {}", id)))?;

                if let Some(name) = request.name {
                    let name = name.trim().to_string();
                    if let Some(other) = metadata
                        .fetch_flow_by_name(flow.bucket_identifier, &name)
                        .await?
                    {
                        if other.identifier != id {
                            return Err(Error::AlreadyExists(format!(
                                "a flow named '{}' already exists in bucket {}",
                                name, flow.bucket_identifier
                            )));
                        }
                    }
                    flow.name = name;
                }
                if let Some(description) = request.description {
                    flow.description = Some(description);
                }
                flow.modified_timestamp = Utc::now();

                metadata.update_flow(&flow).await?;
                Ok(flow)
            })
            .await?;

        log_mutation("update_flow", &revision, user);
        Ok(modified(flow, revision, user))
    }

    /// Delete a flow and all of its snapshots.
    ///
    /// Returns `None` when a previous attempt already removed the metadata.
    pub async fn delete_flow(
        &self,
        id: Uuid,
        claimed: &Revision,
        user: &str,
    ) -> Result<Option<VersionedFlow>> {
        let entity_id = id.to_string();
        let flow = self
            .revisions
            .delete_with_revision(&entity_id, claimed, || async {
                let flow = self.metadata.fetch_flow(id).await?;
                self.purge_flow_content(id).await?;
                self.metadata.delete_flow(id).await?;
                Ok(flow)
            })
            .await?;

        info!(
            subsystem = "registry",
            component = "coordinator",
            op = "delete_flow",
            entity_id = %entity_id,
            user,
            "Flow deleted"
        );
        Ok(flow)
    }

    /// Snapshot content, then snapshot records. The flow record is left to
    /// the caller.
    async fn purge_flow_content(&self, id: Uuid) -> Result<()> {
        self.content.delete_all_content(&id.to_string()).await?;
        let snapshots = self.metadata.delete_snapshot_metadata(id).await?;
        debug!(
            subsystem = "registry",
            component = "coordinator",
            flow_id = %id,
            snapshots,
            "Flow purged"
        );
        Ok(())
    }

    // =========================================================================
    // FLOW SNAPSHOTS
    // =========================================================================

    /// Store the next snapshot of a flow and advance the flow's revision.
    ///
    /// The requested snapshot version must be exactly one past the latest
    /// stored version (the first snapshot is version 1).
    pub async fn create_flow_snapshot(
        &self,
        flow_id: Uuid,
        claimed: &Revision,
        request: CreateSnapshotRequest,
        user: &str,
    ) -> Result<Modified<FlowSnapshotMetadata>> {
        if let Some(comments) = &request.comments {
            validate_description(Some(comments))?;
        }

        let metadata = &self.metadata;
        let content = &self.content;
        let serializer = &self.flow_serializer;
        let (snapshot_metadata, revision) = self
            .revisions
            .update_revision(&flow_id.to_string(), claimed, move || async move {
                let mut flow = metadata
                    .fetch_flow(flow_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("flow {}", flow_id)))?;

                let expected = metadata
                    .latest_snapshot_metadata(flow_id)
                    .await?
                    .map(|latest| latest.version.next())
                    .unwrap_or_else(SnapshotVersion::first);
                if request.version != expected {
                    return Err(Error::InvalidInput(format!(
                        "snapshot version {} of flow {} must be {}",
                        request.version, flow_id, expected
                    )));
                }

                let snapshot = FlowSnapshot {
                    snapshot_metadata: FlowSnapshotMetadata {
                        bucket_identifier: flow.bucket_identifier,
                        flow_identifier: flow_id,
                        version: expected,
                        timestamp: Utc::now(),
                        author: user.to_string(),
                        comments: request.comments,
                    },
                    flow_contents: request.flow_contents,
                    parameter_contexts: request.parameter_contexts,
                };

                let bytes = serializer.serialize(&snapshot)?;
                content
                    .save_content(&flow_id.to_string(), &expected.to_string(), &bytes)
                    .await?;

                if let Err(e) = metadata
                    .insert_snapshot_metadata(&snapshot.snapshot_metadata)
                    .await
                {
                    self.discard_snapshot(flow_id, expected, false).await;
                    return Err(e);
                }

                flow.version_count = expected.value();
                flow.modified_timestamp = snapshot.snapshot_metadata.timestamp;
                if let Err(e) = metadata.update_flow(&flow).await {
                    self.discard_snapshot(flow_id, expected, true).await;
                    return Err(e);
                }

                debug!(
                    subsystem = "registry",
                    component = "coordinator",
                    op = "create_flow_snapshot",
                    flow_id = %flow_id,
                    snapshot_version = expected.value(),
                    payload_len = bytes.len(),
                    "Snapshot stored"
                );
                Ok(snapshot.snapshot_metadata)
            })
            .await?;

        log_mutation("create_flow_snapshot", &revision, user);
        Ok(modified(snapshot_metadata, revision, user))
    }

    /// Undo the writes of a snapshot that could not be recorded in full.
    /// Cleanup failures are logged; the caller reports the original error.
    async fn discard_snapshot(&self, flow_id: Uuid, version: SnapshotVersion, recorded: bool) {
        if recorded {
            if let Err(e) = self
                .metadata
                .delete_snapshot_version(flow_id, version)
                .await
            {
                warn!(
                    subsystem = "registry",
                    component = "coordinator",
                    op = "create_flow_snapshot",
                    entity_id = %flow_id,
                    snapshot_version = version.value(),
                    error = %e,
                    "Snapshot record of failed mutation could not be removed"
                );
            }
        }
        if let Err(e) = self
            .content
            .delete_content(&flow_id.to_string(), &version.to_string())
            .await
        {
            warn!(
                subsystem = "registry",
                component = "coordinator",
                op = "create_flow_snapshot",
                entity_id = %flow_id,
                snapshot_version = version.value(),
                error = %e,
                "Snapshot content of failed mutation could not be removed"
            );
        }
    }

    /// Read one snapshot, decoding whatever data model version it was
    /// written with.
    pub async fn get_flow_snapshot(
        &self,
        flow_id: Uuid,
        version: SnapshotVersion,
    ) -> Result<FlowSnapshot> {
        self.require_flow(flow_id).await?;
        self.metadata
            .fetch_snapshot_metadata(flow_id, version)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("snapshot {} of flow {}", version, flow_id))
            })?;
        self.load_snapshot(flow_id, version).await
    }

    pub async fn get_latest_flow_snapshot(&self, flow_id: Uuid) -> Result<FlowSnapshot> {
        self.require_flow(flow_id).await?;
        let latest = self
            .metadata
            .latest_snapshot_metadata(flow_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("snapshots of flow {}", flow_id)))?;
        self.load_snapshot(flow_id, latest.version).await
    }

    /// Snapshot metadata of a flow, oldest first.
    pub async fn list_flow_snapshots(&self, flow_id: Uuid) -> Result<Vec<FlowSnapshotMetadata>> {
        self.require_flow(flow_id).await?;
        self.metadata.list_snapshot_metadata(flow_id).await
    }

    async fn load_snapshot(&self, flow_id: Uuid, version: SnapshotVersion) -> Result<FlowSnapshot> {
        let bytes = self
            .content
            .get_content(&flow_id.to_string(), &version.to_string())
            .await?;
        let data_model_version = self.flow_serializer.read_data_model_version(&bytes)?;
        let snapshot = self.flow_serializer.deserialize(&bytes).inspect_err(|e| {
            error!(
                subsystem = "registry",
                component = "coordinator",
                op = "get_flow_snapshot",
                flow_id = %flow_id,
                snapshot_version = version.value(),
                data_model_version,
                error = %e,
                "Stored snapshot could not be decoded"
            );
        })?;
        debug!(
            subsystem = "registry",
            component = "coordinator",
            flow_id = %flow_id,
            snapshot_version = version.value(),
            data_model_version,
            "Snapshot decoded"
        );
        Ok(snapshot)
    }

    // =========================================================================
    // EXTENSION BUNDLES
    // =========================================================================

    /// Create an extension bundle. The (group, artifact) pair is unique
    /// within a bucket.
    pub async fn create_extension_bundle(
        &self,
        request: CreateExtensionBundleRequest,
        claimed: &Revision,
        user: &str,
    ) -> Result<Modified<ExtensionBundle>> {
        validate_name("bundle group id", &request.group_id)?;
        validate_name("bundle artifact id", &request.artifact_id)?;
        validate_description(request.description.as_deref())?;

        let id = request.identifier.unwrap_or_else(Uuid::new_v4);
        let entity_id = id.to_string();
        let claimed = bind_claim(&entity_id, claimed)?;

        let now = Utc::now();
        let bundle = ExtensionBundle {
            identifier: id,
            bucket_identifier: request.bucket_identifier,
            bundle_type: request.bundle_type,
            group_id: request.group_id.trim().to_string(),
            artifact_id: request.artifact_id.trim().to_string(),
            description: request.description,
            created_timestamp: now,
            modified_timestamp: now,
            version_count: 0,
        };

        let metadata = &self.metadata;
        let new_bundle = &bundle;
        let ((), revision) = self
            .revisions
            .create_revision(&entity_id, &claimed, move || async move {
                let bucket_id = new_bundle.bucket_identifier;
                if metadata.fetch_bucket(bucket_id).await?.is_none() {
                    return Err(Error::NotFound(format!("bucket {}", bucket_id)));
                }
                if metadata
                    .fetch_bundle_by_coordinate(
                        bucket_id,
                        &new_bundle.group_id,
                        &new_bundle.artifact_id,
                    )
                    .await?
                    .is_some()
                {
                    return Err(Error::AlreadyExists(format!(
                        "bundle {}:{} already exists in bucket {}",
                        new_bundle.group_id, new_bundle.artifact_id, bucket_id
                    )));
                }
                metadata.insert_bundle(new_bundle).await
            })
            .await?;

        log_mutation("create_extension_bundle", &revision, user);
        Ok(modified(bundle, revision, user))
    }

    pub async fn get_extension_bundle(&self, id: Uuid) -> Result<Revisioned<ExtensionBundle>> {
        let bundle = self.require_bundle(id).await?;
        let revision = self.revisions.get_revision(&id.to_string()).await?;
        Ok(Revisioned {
            entity: bundle,
            revision,
        })
    }

    pub async fn list_extension_bundles(
        &self,
        bucket_id: Uuid,
    ) -> Result<Vec<Revisioned<ExtensionBundle>>> {
        self.require_bucket(bucket_id).await?;
        let bundles = self.metadata.list_bundles(bucket_id).await?;
        let mut out = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let revision = self
                .revisions
                .get_revision(&bundle.identifier.to_string())
                .await?;
            out.push(Revisioned {
                entity: bundle,
                revision,
            });
        }
        Ok(out)
    }

    pub async fn update_extension_bundle(
        &self,
        id: Uuid,
        claimed: &Revision,
        request: UpdateExtensionBundleRequest,
        user: &str,
    ) -> Result<Modified<ExtensionBundle>> {
        validate_description(request.description.as_deref())?;

        let metadata = &self.metadata;
        let (bundle, revision) = self
            .revisions
            .update_revision(&id.to_string(), claimed, move || async move {
                let mut bundle = metadata
                    .fetch_bundle(id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("bundle {}", id)))?;
                if let Some(description) = request.description {
                    bundle.description = Some(description);
                }
                bundle.modified_timestamp = Utc::now();
                metadata.update_bundle(&bundle).await?;
                Ok(bundle)
            })
            .await?;

        log_mutation("update_extension_bundle", &revision, user);
        Ok(modified(bundle, revision, user))
    }

    /// Delete a bundle and every uploaded version of it.
    ///
    /// Returns `None` when a previous attempt already removed the metadata.
    pub async fn delete_extension_bundle(
        &self,
        id: Uuid,
        claimed: &Revision,
        user: &str,
    ) -> Result<Option<ExtensionBundle>> {
        let entity_id = id.to_string();
        let bundle = self
            .revisions
            .delete_with_revision(&entity_id, claimed, || async {
                let bundle = self.metadata.fetch_bundle(id).await?;
                self.purge_bundle_content(id).await?;
                self.metadata.delete_bundle(id).await?;
                Ok(bundle)
            })
            .await?;

        info!(
            subsystem = "registry",
            component = "coordinator",
            op = "delete_extension_bundle",
            entity_id = %entity_id,
            user,
            "Extension bundle deleted"
        );
        Ok(bundle)
    }

    async fn purge_bundle_content(&self, id: Uuid) -> Result<()> {
        self.content.delete_all_content(&id.to_string()).await?;
        self.metadata.delete_bundle_versions(id).await?;
        Ok(())
    }

    /// Upload one version of a bundle's artifact.
    ///
    /// Re-uploading an existing version is rejected unless the owning bucket
    /// allows redeploys. The bundle's revision advances either way.
    pub async fn add_bundle_version(
        &self,
        bundle_id: Uuid,
        claimed: &Revision,
        version: &str,
        data: &[u8],
        user: &str,
    ) -> Result<Modified<BundleVersionMetadata>> {
        let version = version.trim();
        if version.is_empty() {
            return Err(Error::InvalidInput("bundle version cannot be empty".into()));
        }

        let metadata = &self.metadata;
        let content = &self.content;
        let (version_metadata, revision) = self
            .revisions
            .update_revision(&bundle_id.to_string(), claimed, move || async move {
                let mut bundle = metadata
                    .fetch_bundle(bundle_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("bundle {}", bundle_id)))?;
                let bucket = metadata
                    .fetch_bucket(bundle.bucket_identifier)
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("bucket {}", bundle.bucket_identifier))
                    })?;

                let existing = metadata.fetch_bundle_version(bundle_id, version).await?;
                if existing.is_some() && !bucket.allow_bundle_redeploy {
                    return Err(Error::AlreadyExists(format!(
                        "version {} of bundle {}:{} already exists and bucket '{}' does not allow redeploy",
                        version, bundle.group_id, bundle.artifact_id, bucket.name
                    )));
                }

                let version_metadata = BundleVersionMetadata {
                    bundle_identifier: bundle_id,
                    version: version.to_string(),
                    sha256: sha256_hex(data),
                    content_size: data.len() as u64,
                    author: user.to_string(),
                    timestamp: Utc::now(),
                };

                let bundle_key = bundle_id.to_string();
                let previous_bytes = if existing.is_some() {
                    match content.get_content(&bundle_key, version).await {
                        Ok(bytes) => Some(bytes),
                        Err(Error::NotFound(_)) => None,
                        Err(e) => return Err(e),
                    }
                } else {
                    None
                };

                content.save_content(&bundle_key, version, data).await?;

                let recorded = async {
                    metadata.put_bundle_version(&version_metadata).await?;
                    if existing.is_none() {
                        bundle.version_count += 1;
                    }
                    bundle.modified_timestamp = version_metadata.timestamp;
                    metadata.update_bundle(&bundle).await
                }
                .await;
                if let Err(e) = recorded {
                    self.restore_bundle_version(
                        bundle_id,
                        version,
                        existing.as_ref(),
                        previous_bytes.as_deref(),
                    )
                    .await;
                    return Err(e);
                }

                debug!(
                    subsystem = "registry",
                    component = "coordinator",
                    op = "add_bundle_version",
                    bundle_id = %bundle_id,
                    version,
                    redeploy = existing.is_some(),
                    payload_len = data.len(),
                    "Bundle version stored"
                );
                Ok(version_metadata)
            })
            .await?;

        log_mutation("add_bundle_version", &revision, user);
        Ok(modified(version_metadata, revision, user))
    }

    /// Put a bundle version back the way it was before a failed upload: the
    /// prior record and bytes for a redeploy, nothing for a new version.
    async fn restore_bundle_version(
        &self,
        bundle_id: Uuid,
        version: &str,
        previous: Option<&BundleVersionMetadata>,
        previous_bytes: Option<&[u8]>,
    ) {
        let record = match previous {
            Some(prior) => self.metadata.put_bundle_version(prior).await,
            None => self
                .metadata
                .delete_bundle_version(bundle_id, version)
                .await
                .map(|_| ()),
        };
        if let Err(e) = record {
            warn!(
                subsystem = "registry",
                component = "coordinator",
                op = "add_bundle_version",
                entity_id = %bundle_id,
                version,
                error = %e,
                "Bundle version record of failed mutation could not be restored"
            );
        }

        let key = bundle_id.to_string();
        let bytes = match previous_bytes {
            Some(prior) => self.content.save_content(&key, version, prior).await,
            None => self.content.delete_content(&key, version).await,
        };
        if let Err(e) = bytes {
            warn!(
                subsystem = "registry",
                component = "coordinator",
                op = "add_bundle_version",
                entity_id = %bundle_id,
                version,
                error = %e,
                "Bundle content of failed mutation could not be restored"
            );
        }
    }

    /// Versions of a bundle in upload order.
    pub async fn list_bundle_versions(&self, bundle_id: Uuid) -> Result<Vec<BundleVersionMetadata>> {
        self.require_bundle(bundle_id).await?;
        self.metadata.list_bundle_versions(bundle_id).await
    }

    /// Read a bundle version's bytes, verifying the stored checksum.
    pub async fn get_bundle_version_content(
        &self,
        bundle_id: Uuid,
        version: &str,
    ) -> Result<(BundleVersionMetadata, Vec<u8>)> {
        let version_metadata = self
            .metadata
            .fetch_bundle_version(bundle_id, version)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("version {} of bundle {}", version, bundle_id))
            })?;
        let data = self
            .content
            .get_content(&bundle_id.to_string(), version)
            .await?;

        let actual = sha256_hex(&data);
        if actual != version_metadata.sha256 {
            error!(
                subsystem = "registry",
                component = "coordinator",
                op = "get_bundle_version_content",
                bundle_id = %bundle_id,
                version,
                expected = %version_metadata.sha256,
                actual = %actual,
                "Bundle content checksum mismatch"
            );
            return Err(Error::Persistence(format!(
                "checksum mismatch for version {} of bundle {}",
                version, bundle_id
            )));
        }
        Ok((version_metadata, data))
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    async fn require_bucket(&self, id: Uuid) -> Result<Bucket> {
        self.metadata
            .fetch_bucket(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("bucket {}", id)))
    }

    async fn require_flow(&self, id: Uuid) -> Result<VersionedFlow> {
        self.metadata
            .fetch_flow(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("flow {}", id)))
    }

    async fn require_bundle(&self, id: Uuid) -> Result<ExtensionBundle> {
        self.metadata
            .fetch_bundle(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("bundle {}", id)))
    }
}

/// Attach a server-assigned id to a create claim. The claim may leave its
/// entity id empty; if it names one, it must be this one.
fn bind_claim(entity_id: &str, claimed: &Revision) -> Result<Revision> {
    if !claimed.entity_id.is_empty() && claimed.entity_id != entity_id {
        return Err(Error::InvalidRevision(format!(
            "revision for {} presented when creating {}",
            claimed.entity_id, entity_id
        )));
    }
    Ok(Revision::new(
        entity_id,
        claimed.version,
        claimed.client_id.clone(),
    ))
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} name cannot be blank", kind)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "{} name exceeds {} characters",
            kind, MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => Err(Error::InvalidInput(format!(
            "description exceeds {} characters",
            MAX_DESCRIPTION_LEN
        ))),
        _ => Ok(()),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn modified<T>(entity: T, revision: Revision, user: &str) -> Modified<T> {
    Modified {
        entity,
        modification: EntityModification::new(revision, user),
    }
}

fn log_mutation(op: &str, revision: &Revision, user: &str) {
    info!(
        subsystem = "registry",
        component = "coordinator",
        op,
        entity_id = %revision.entity_id,
        new_version = revision.version,
        client_id = %revision.client_id,
        user,
        "Entity modified"
    );
}
