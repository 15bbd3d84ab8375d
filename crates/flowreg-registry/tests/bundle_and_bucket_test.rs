//! Extension bundles and bucket lifecycle through the coordinator.
//!
//! Covers bundle checksums and redeploy policy, bucket renames, and the
//! cascade performed by bucket deletion.

use flowreg_core::{
    BundleType, CreateBucketRequest, CreateExtensionBundleRequest, CreateFlowRequest,
    CreateSnapshotRequest, Error, Revision, SnapshotVersion, UpdateBucketRequest,
    UpdateExtensionBundleRequest,
};
use flowreg_db::test_fixtures::{sample_parameter_contexts, sample_process_group};
use flowreg_registry::{build_registry, PersistenceBackend, RegistryConfig, RegistryCoordinator};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use uuid::Uuid;

async fn create_bucket(registry: &RegistryCoordinator, name: &str) -> Uuid {
    registry
        .create_bucket(
            CreateBucketRequest {
                name: name.into(),
                ..Default::default()
            },
            &Revision::initial("", "c1"),
            "alice",
        )
        .await
        .unwrap()
        .entity
        .identifier
}

async fn create_bundle(registry: &RegistryCoordinator, bucket_id: Uuid) -> Uuid {
    registry
        .create_extension_bundle(
            CreateExtensionBundleRequest {
                identifier: None,
                bucket_identifier: bucket_id,
                bundle_type: BundleType::NifiNar,
                group_id: "org.example".into(),
                artifact_id: "nifi-example-nar".into(),
                description: None,
            },
            &Revision::initial("", "c1"),
            "alice",
        )
        .await
        .unwrap()
        .entity
        .identifier
}

async fn claim(registry: &RegistryCoordinator, entity_id: Uuid) -> Revision {
    registry
        .revisions()
        .get_revision(&entity_id.to_string())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_bundle_version_checksum_and_redeploy_policy() {
    let registry = build_registry(&RegistryConfig::in_memory()).await.unwrap();
    let bucket_id = create_bucket(&registry, "extensions").await;
    let bundle_id = create_bundle(&registry, bucket_id).await;

    let nar = b"PK\x03\x04 pretend this is a nar".to_vec();
    let added = registry
        .add_bundle_version(
            bundle_id,
            &claim(&registry, bundle_id).await,
            "1.0.0",
            &nar,
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(added.entity.sha256, hex::encode(Sha256::digest(&nar)));
    assert_eq!(added.entity.content_size, nar.len() as u64);
    assert_eq!(added.revision().version, 1);

    let (meta, bytes) = registry
        .get_bundle_version_content(bundle_id, "1.0.0")
        .await
        .unwrap();
    assert_eq!(bytes, nar);
    assert_eq!(meta, added.entity);

    // Redeploy is off by default
    let err = registry
        .add_bundle_version(
            bundle_id,
            &claim(&registry, bundle_id).await,
            "1.0.0",
            b"different",
            "alice",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
    assert_eq!(claim(&registry, bundle_id).await.version, 1);

    registry
        .update_bucket(
            bucket_id,
            &claim(&registry, bucket_id).await,
            UpdateBucketRequest {
                allow_bundle_redeploy: Some(true),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    let redeployed = registry
        .add_bundle_version(
            bundle_id,
            &claim(&registry, bundle_id).await,
            "1.0.0",
            b"different",
            "bob",
        )
        .await
        .unwrap();
    assert_eq!(redeployed.entity.author, "bob");
    assert_eq!(redeployed.revision().version, 2);

    registry
        .add_bundle_version(
            bundle_id,
            &claim(&registry, bundle_id).await,
            "1.1.0",
            b"next",
            "bob",
        )
        .await
        .unwrap();

    let bundle = registry.get_extension_bundle(bundle_id).await.unwrap();
    assert_eq!(bundle.entity.version_count, 2);
    let versions: Vec<String> = registry
        .list_bundle_versions(bundle_id)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(versions, vec!["1.0.0", "1.1.0"]);
}

#[tokio::test]
async fn test_corrupted_bundle_content_detected() {
    let dir = TempDir::new().unwrap();
    let config = RegistryConfig {
        persistence: PersistenceBackend::Filesystem,
        storage_dir: dir.path().to_path_buf(),
        validate_storage: false,
    };
    let registry = build_registry(&config).await.unwrap();
    let bucket_id = create_bucket(&registry, "extensions").await;
    let bundle_id = create_bundle(&registry, bucket_id).await;

    registry
        .add_bundle_version(
            bundle_id,
            &claim(&registry, bundle_id).await,
            "2.0.0",
            b"original",
            "alice",
        )
        .await
        .unwrap();

    let path = dir
        .path()
        .join(bundle_id.to_string())
        .join("2.0.0.snapshot");
    std::fs::write(&path, b"tampered").unwrap();

    let err = registry
        .get_bundle_version_content(bundle_id, "2.0.0")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
}

#[tokio::test]
async fn test_bundle_coordinates_unique_per_bucket() {
    let registry = build_registry(&RegistryConfig::in_memory()).await.unwrap();
    let first = create_bucket(&registry, "first").await;
    let second = create_bucket(&registry, "second").await;
    create_bundle(&registry, first).await;

    let duplicate = registry
        .create_extension_bundle(
            CreateExtensionBundleRequest {
                identifier: None,
                bucket_identifier: first,
                bundle_type: BundleType::NifiNar,
                group_id: "org.example".into(),
                artifact_id: "nifi-example-nar".into(),
                description: None,
            },
            &Revision::initial("", "c1"),
            "alice",
        )
        .await;
    assert!(matches!(duplicate, Err(Error::AlreadyExists(_))));

    // Same coordinate in another bucket is fine
    create_bundle(&registry, second).await;
    assert_eq!(registry.list_extension_bundles(first).await.unwrap().len(), 1);
    assert_eq!(registry.list_extension_bundles(second).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_bundle_and_bucket() {
    let registry = build_registry(&RegistryConfig::in_memory()).await.unwrap();
    let bucket_id = create_bucket(&registry, "alpha").await;
    create_bucket(&registry, "beta").await;
    let bundle_id = create_bundle(&registry, bucket_id).await;

    let updated = registry
        .update_extension_bundle(
            bundle_id,
            &claim(&registry, bundle_id).await,
            UpdateExtensionBundleRequest {
                description: Some("processors for example.org".into()),
            },
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(
        updated.entity.description.as_deref(),
        Some("processors for example.org")
    );
    assert_eq!(updated.revision().version, 1);

    // Renaming onto another bucket's name is rejected
    let err = registry
        .update_bucket(
            bucket_id,
            &claim(&registry, bucket_id).await,
            UpdateBucketRequest {
                name: Some("Beta".into()),
                ..Default::default()
            },
            "alice",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));

    // Renaming to a case variant of its own name is allowed
    let renamed = registry
        .update_bucket(
            bucket_id,
            &claim(&registry, bucket_id).await,
            UpdateBucketRequest {
                name: Some("Alpha".into()),
                ..Default::default()
            },
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(renamed.entity.name, "Alpha");

    let names: Vec<String> = registry
        .list_buckets()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.entity.name)
        .collect();
    assert_eq!(names, vec!["Alpha", "beta"]);
}

#[tokio::test]
async fn test_bucket_delete_cascades() {
    let dir = TempDir::new().unwrap();
    let config = RegistryConfig {
        persistence: PersistenceBackend::Filesystem,
        storage_dir: dir.path().to_path_buf(),
        validate_storage: true,
    };
    let registry = build_registry(&config).await.unwrap();
    let bucket_id = create_bucket(&registry, "doomed").await;
    let keep_id = create_bucket(&registry, "kept").await;

    let flow_id = registry
        .create_flow(
            CreateFlowRequest {
                identifier: None,
                bucket_identifier: bucket_id,
                name: "ingest".into(),
                description: None,
            },
            &Revision::initial("", "c1"),
            "alice",
        )
        .await
        .unwrap()
        .entity
        .identifier;
    registry
        .create_flow_snapshot(
            flow_id,
            &claim(&registry, flow_id).await,
            CreateSnapshotRequest {
                version: SnapshotVersion(1),
                comments: None,
                flow_contents: sample_process_group("root"),
                parameter_contexts: sample_parameter_contexts(),
            },
            "alice",
        )
        .await
        .unwrap();

    let bundle_id = create_bundle(&registry, bucket_id).await;
    registry
        .add_bundle_version(
            bundle_id,
            &claim(&registry, bundle_id).await,
            "1.0.0",
            b"nar",
            "alice",
        )
        .await
        .unwrap();

    assert!(dir.path().join(flow_id.to_string()).exists());
    assert!(dir.path().join(bundle_id.to_string()).exists());

    let deleted = registry
        .delete_bucket(bucket_id, &claim(&registry, bucket_id).await, "admin")
        .await
        .unwrap();
    assert_eq!(deleted.map(|b| b.name), Some("doomed".to_string()));

    assert!(!dir.path().join(flow_id.to_string()).exists());
    assert!(!dir.path().join(bundle_id.to_string()).exists());
    for id in [bucket_id, flow_id, bundle_id] {
        assert!(!registry
            .revisions()
            .is_revisioned(&id.to_string())
            .await
            .unwrap());
    }
    assert!(matches!(
        registry.get_flow(flow_id).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        registry.get_extension_bundle(bundle_id).await,
        Err(Error::NotFound(_))
    ));

    let remaining: Vec<Uuid> = registry
        .list_buckets()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.entity.identifier)
        .collect();
    assert_eq!(remaining, vec![keep_id]);
}
