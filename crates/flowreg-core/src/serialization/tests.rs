use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use super::*;
use crate::defaults::FLOW_SNAPSHOT_MAGIC;
use crate::error::Error;
use crate::models::*;

fn sample_group() -> VersionedProcessGroup {
    let mut properties = BTreeMap::new();
    properties.insert("Directory".to_string(), "/data/in".to_string());

    VersionedProcessGroup {
        identifier: "root".to_string(),
        name: "ingest".to_string(),
        comments: Some("pulls files".to_string()),
        processors: vec![
            VersionedProcessor {
                identifier: "p1".to_string(),
                name: "GetFile".to_string(),
                processor_type: "org.apache.nifi.processors.standard.GetFile".to_string(),
                properties,
                scheduling_period: Some("10 sec".to_string()),
            },
            VersionedProcessor {
                identifier: "p2".to_string(),
                name: "LogAttribute".to_string(),
                processor_type: "org.apache.nifi.processors.standard.LogAttribute".to_string(),
                ..Default::default()
            },
        ],
        process_groups: vec![VersionedProcessGroup {
            identifier: "child".to_string(),
            name: "nested".to_string(),
            processors: vec![VersionedProcessor {
                identifier: "p3".to_string(),
                name: "UpdateAttribute".to_string(),
                processor_type: "org.apache.nifi.processors.attributes.UpdateAttribute"
                    .to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }],
        connections: vec![VersionedConnection {
            identifier: "c1".to_string(),
            source_id: "p1".to_string(),
            destination_id: "p2".to_string(),
            selected_relationships: vec!["success".to_string()],
        }],
        variables: BTreeMap::new(),
    }
}

fn sample_snapshot(version: u32) -> FlowSnapshot {
    FlowSnapshot {
        snapshot_metadata: FlowSnapshotMetadata {
            bucket_identifier: Uuid::new_v4(),
            flow_identifier: Uuid::new_v4(),
            version: SnapshotVersion(version),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            author: "alice".to_string(),
            comments: Some("first cut".to_string()),
        },
        flow_contents: sample_group(),
        parameter_contexts: BTreeMap::new(),
    }
}

fn legacy_only_registry() -> SerializerRegistry<FlowSnapshot> {
    SerializerRegistry::new(FLOW_SNAPSHOT_MAGIC)
        .with(Box::new(FlowSnapshotSerializerV1))
        .unwrap()
        .with_current_version(1)
        .unwrap()
}

#[test]
fn test_default_registry_writes_version_two_and_reads_both() {
    let registry = flow_snapshot_serializer().unwrap();
    assert_eq!(registry.current_version(), Some(2));
    assert_eq!(registry.supported_versions(), vec![1, 2]);
}

#[test]
fn test_v2_round_trip_preserves_all_fields() {
    let mut snapshot = sample_snapshot(3);
    snapshot
        .flow_contents
        .variables
        .insert("env".to_string(), "prod".to_string());
    snapshot.parameter_contexts.insert(
        "shared".to_string(),
        VersionedParameterContext {
            name: "shared".to_string(),
            description: None,
            parameters: vec![VersionedParameter {
                name: "db.password".to_string(),
                value: None,
                sensitive: true,
            }],
        },
    );

    let registry = flow_snapshot_serializer().unwrap();
    let bytes = registry.serialize(&snapshot).unwrap();
    assert_eq!(&bytes[..5], b"Flows");
    assert_eq!(registry.read_data_model_version(&bytes).unwrap(), 2);
    assert_eq!(registry.deserialize(&bytes).unwrap(), snapshot);
}

#[test]
fn test_v1_round_trip_preserves_representable_fields() {
    let snapshot = sample_snapshot(1);
    let v1 = FlowSnapshotSerializerV1;
    let body = v1.encode(&snapshot).unwrap();
    assert_eq!(v1.decode(&body).unwrap(), snapshot);
}

#[test]
fn test_v1_body_uses_legacy_field_names() {
    let body = FlowSnapshotSerializerV1.encode(&sample_snapshot(1)).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json.get("flow_contents").is_some());
    assert_eq!(
        json["flow_contents"]["processors"][0]["class"],
        "org.apache.nifi.processors.standard.GetFile"
    );
    assert!(json.get("flowContents").is_none());
}

#[test]
fn test_v1_cannot_encode_parameter_contexts() {
    let mut snapshot = sample_snapshot(1);
    snapshot
        .parameter_contexts
        .insert("ctx".to_string(), VersionedParameterContext::default());
    let err = FlowSnapshotSerializerV1.encode(&snapshot).unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[test]
fn test_v1_cannot_encode_nested_variables() {
    let mut snapshot = sample_snapshot(1);
    snapshot.flow_contents.process_groups[0]
        .variables
        .insert("k".to_string(), "v".to_string());
    assert!(FlowSnapshotSerializerV1.encode(&snapshot).is_err());
}

#[test]
fn test_legacy_payload_readable_after_upgrade() {
    let snapshot = sample_snapshot(1);
    let legacy_bytes = legacy_only_registry().serialize(&snapshot).unwrap();

    let current = flow_snapshot_serializer().unwrap();
    assert_eq!(current.read_data_model_version(&legacy_bytes).unwrap(), 1);

    let via_current = current.deserialize(&legacy_bytes).unwrap();
    let via_legacy = legacy_only_registry().deserialize(&legacy_bytes).unwrap();
    assert_eq!(via_current, via_legacy);
    assert_eq!(via_current, snapshot);

    let rewritten = current.serialize(&via_current).unwrap();
    assert_eq!(current.read_data_model_version(&rewritten).unwrap(), 2);
}

#[test]
fn test_future_version_is_unsupported() {
    let registry = flow_snapshot_serializer().unwrap();
    let payload = write_header(FLOW_SNAPSHOT_MAGIC, 3, b"{\"anything\":true}");
    match registry.deserialize(&payload) {
        Err(Error::UnsupportedDataModelVersion { version, supported }) => {
            assert_eq!(version, 3);
            assert_eq!(supported, vec![1, 2]);
        }
        other => panic!("expected UnsupportedDataModelVersion, got {:?}", other),
    }
}

#[test]
fn test_malformed_body_is_serialization_error() {
    let registry = flow_snapshot_serializer().unwrap();
    let payload = write_header(FLOW_SNAPSHOT_MAGIC, 2, b"{not json");
    assert!(matches!(
        registry.deserialize(&payload),
        Err(Error::Serialization(_))
    ));
}

#[test]
fn test_dangling_connection_is_rejected_on_encode() {
    let mut snapshot = sample_snapshot(1);
    snapshot.flow_contents.connections[0].destination_id = "ghost".to_string();
    let err = flow_snapshot_serializer()
        .unwrap()
        .serialize(&snapshot)
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn test_duplicate_component_id_is_rejected_on_encode() {
    let mut snapshot = sample_snapshot(1);
    snapshot.flow_contents.process_groups[0].processors[0].identifier = "p1".to_string();
    assert!(FlowSnapshotSerializerV2.encode(&snapshot).is_err());
}

#[test]
fn test_connection_into_child_group_is_valid() {
    let mut snapshot = sample_snapshot(1);
    snapshot.flow_contents.connections.push(VersionedConnection {
        identifier: "c2".to_string(),
        source_id: "p2".to_string(),
        destination_id: "p3".to_string(),
        selected_relationships: vec![],
    });
    assert!(FlowSnapshotSerializerV2.encode(&snapshot).is_ok());
}
