//! Test data builders shared by unit and integration tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flowreg_db::test_fixtures::{sample_bucket, sample_flow};
//!
//! let bucket = sample_bucket("Analytics");
//! let flow = sample_flow(bucket.identifier, "ingest");
//! ```

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use flowreg_core::{
    Bucket, BundleType, ExtensionBundle, FlowSnapshotMetadata, SnapshotVersion,
    VersionedConnection, VersionedFlow, VersionedParameter, VersionedParameterContext,
    VersionedProcessGroup, VersionedProcessor,
};

/// Bucket with a fresh identifier and default policy flags.
pub fn sample_bucket(name: &str) -> Bucket {
    Bucket {
        identifier: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
        created_timestamp: Utc::now(),
        allow_bundle_redeploy: false,
        allow_public_read: false,
    }
}

pub fn sample_flow(bucket_id: Uuid, name: &str) -> VersionedFlow {
    let now = Utc::now();
    VersionedFlow {
        identifier: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
        bucket_identifier: bucket_id,
        created_timestamp: now,
        modified_timestamp: now,
        version_count: 0,
    }
}

pub fn sample_snapshot_metadata(flow: &VersionedFlow, version: u32) -> FlowSnapshotMetadata {
    FlowSnapshotMetadata {
        bucket_identifier: flow.bucket_identifier,
        flow_identifier: flow.identifier,
        version: SnapshotVersion(version),
        timestamp: Utc::now(),
        author: "tester".to_string(),
        comments: None,
    }
}

pub fn sample_bundle(bucket_id: Uuid, group_id: &str, artifact_id: &str) -> ExtensionBundle {
    let now = Utc::now();
    ExtensionBundle {
        identifier: Uuid::new_v4(),
        bucket_identifier: bucket_id,
        bundle_type: BundleType::NifiNar,
        group_id: group_id.to_string(),
        artifact_id: artifact_id.to_string(),
        description: None,
        created_timestamp: now,
        modified_timestamp: now,
        version_count: 0,
    }
}

/// Two processors joined by one connection.
pub fn sample_process_group(name: &str) -> VersionedProcessGroup {
    let generate = VersionedProcessor {
        identifier: "proc-generate".to_string(),
        name: "GenerateFlowFile".to_string(),
        processor_type: "org.apache.nifi.processors.standard.GenerateFlowFile".to_string(),
        properties: BTreeMap::new(),
        scheduling_period: Some("1 min".to_string()),
    };
    let log = VersionedProcessor {
        identifier: "proc-log".to_string(),
        name: "LogAttribute".to_string(),
        processor_type: "org.apache.nifi.processors.standard.LogAttribute".to_string(),
        properties: BTreeMap::from([("Log Level".to_string(), "info".to_string())]),
        scheduling_period: None,
    };
    VersionedProcessGroup {
        identifier: "root-group".to_string(),
        name: name.to_string(),
        comments: None,
        processors: vec![generate, log],
        process_groups: Vec::new(),
        connections: vec![VersionedConnection {
            identifier: "conn-1".to_string(),
            source_id: "proc-generate".to_string(),
            destination_id: "proc-log".to_string(),
            selected_relationships: vec!["success".to_string()],
        }],
        variables: BTreeMap::new(),
    }
}

/// Parameter context map with a single non-sensitive parameter.
pub fn sample_parameter_contexts() -> BTreeMap<String, VersionedParameterContext> {
    BTreeMap::from([(
        "env".to_string(),
        VersionedParameterContext {
            name: "env".to_string(),
            description: None,
            parameters: vec![VersionedParameter {
                name: "region".to_string(),
                value: Some("eu-west-1".to_string()),
                sensitive: false,
            }],
        },
    )])
}
