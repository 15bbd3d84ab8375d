//! Flow snapshot payload formats.
//!
//! | Version | Layout |
//! |---------|--------|
//! | 1 | Legacy JSON, snake_case fields, contents under `flow_contents`, no parameter contexts or variables |
//! | 2 | JSON, camelCase fields, parameter contexts and process group variables |
//!
//! Decoding a version 1 payload yields a snapshot with empty parameter
//! contexts and variables: the model as it was understood when written.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::registry::{SerializerRegistry, VersionedSerializer};
use crate::defaults::{CURRENT_FLOW_DATA_MODEL_VERSION, FLOW_SNAPSHOT_MAGIC};
use crate::error::{Error, Result};
use crate::models::{
    FlowSnapshot, FlowSnapshotMetadata, SnapshotVersion, VersionedConnection,
    VersionedProcessGroup, VersionedProcessor,
};

/// Build the flow snapshot registry with every historical format, writing
/// the current one.
pub fn flow_snapshot_serializer() -> Result<SerializerRegistry<FlowSnapshot>> {
    SerializerRegistry::new(FLOW_SNAPSHOT_MAGIC)
        .with(Box::new(FlowSnapshotSerializerV1))?
        .with(Box::new(FlowSnapshotSerializerV2))?
        .with_current_version(CURRENT_FLOW_DATA_MODEL_VERSION)
}

// =============================================================================
// VERSION 2
// =============================================================================

/// Current camelCase JSON layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowSnapshotSerializerV2;

impl VersionedSerializer<FlowSnapshot> for FlowSnapshotSerializerV2 {
    fn data_model_version(&self) -> u32 {
        2
    }

    fn encode(&self, value: &FlowSnapshot) -> Result<Vec<u8>> {
        validate_graph(&value.flow_contents)?;
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<FlowSnapshot> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// =============================================================================
// VERSION 1 (legacy)
// =============================================================================

/// Legacy snake_case JSON layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowSnapshotSerializerV1;

#[derive(Serialize, Deserialize)]
struct SnapshotV1 {
    metadata: MetadataV1,
    flow_contents: GroupV1,
}

#[derive(Serialize, Deserialize)]
struct MetadataV1 {
    bucket_id: Uuid,
    flow_id: Uuid,
    version: u32,
    timestamp: DateTime<Utc>,
    author: String,
    #[serde(default)]
    comments: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct GroupV1 {
    id: String,
    name: String,
    #[serde(default)]
    comments: Option<String>,
    #[serde(default)]
    processors: Vec<ProcessorV1>,
    #[serde(default)]
    child_groups: Vec<GroupV1>,
    #[serde(default)]
    connections: Vec<ConnectionV1>,
}

#[derive(Serialize, Deserialize)]
struct ProcessorV1 {
    id: String,
    name: String,
    class: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    scheduling_period: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ConnectionV1 {
    id: String,
    source: String,
    destination: String,
    #[serde(default)]
    relationships: Vec<String>,
}

impl GroupV1 {
    fn from_model(group: &VersionedProcessGroup) -> Result<Self> {
        if !group.variables.is_empty() {
            return Err(Error::Serialization(format!(
                "process group {} declares variables, which data model version 1 cannot represent",
                group.identifier
            )));
        }
        Ok(Self {
            id: group.identifier.clone(),
            name: group.name.clone(),
            comments: group.comments.clone(),
            processors: group
                .processors
                .iter()
                .map(|p| ProcessorV1 {
                    id: p.identifier.clone(),
                    name: p.name.clone(),
                    class: p.processor_type.clone(),
                    properties: p.properties.clone(),
                    scheduling_period: p.scheduling_period.clone(),
                })
                .collect(),
            child_groups: group
                .process_groups
                .iter()
                .map(GroupV1::from_model)
                .collect::<Result<_>>()?,
            connections: group
                .connections
                .iter()
                .map(|c| ConnectionV1 {
                    id: c.identifier.clone(),
                    source: c.source_id.clone(),
                    destination: c.destination_id.clone(),
                    relationships: c.selected_relationships.clone(),
                })
                .collect(),
        })
    }

    fn into_model(self) -> VersionedProcessGroup {
        VersionedProcessGroup {
            identifier: self.id,
            name: self.name,
            comments: self.comments,
            processors: self
                .processors
                .into_iter()
                .map(|p| VersionedProcessor {
                    identifier: p.id,
                    name: p.name,
                    processor_type: p.class,
                    properties: p.properties,
                    scheduling_period: p.scheduling_period,
                })
                .collect(),
            process_groups: self
                .child_groups
                .into_iter()
                .map(GroupV1::into_model)
                .collect(),
            connections: self
                .connections
                .into_iter()
                .map(|c| VersionedConnection {
                    identifier: c.id,
                    source_id: c.source,
                    destination_id: c.destination,
                    selected_relationships: c.relationships,
                })
                .collect(),
            variables: BTreeMap::new(),
        }
    }
}

impl VersionedSerializer<FlowSnapshot> for FlowSnapshotSerializerV1 {
    fn data_model_version(&self) -> u32 {
        1
    }

    fn encode(&self, value: &FlowSnapshot) -> Result<Vec<u8>> {
        validate_graph(&value.flow_contents)?;
        if !value.parameter_contexts.is_empty() {
            return Err(Error::Serialization(
                "parameter contexts cannot be represented in data model version 1".to_string(),
            ));
        }

        let meta = &value.snapshot_metadata;
        let legacy = SnapshotV1 {
            metadata: MetadataV1 {
                bucket_id: meta.bucket_identifier,
                flow_id: meta.flow_identifier,
                version: meta.version.value(),
                timestamp: meta.timestamp,
                author: meta.author.clone(),
                comments: meta.comments.clone(),
            },
            flow_contents: GroupV1::from_model(&value.flow_contents)?,
        };
        Ok(serde_json::to_vec(&legacy)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<FlowSnapshot> {
        let legacy: SnapshotV1 = serde_json::from_slice(bytes)?;
        let meta = legacy.metadata;
        Ok(FlowSnapshot {
            snapshot_metadata: FlowSnapshotMetadata {
                bucket_identifier: meta.bucket_id,
                flow_identifier: meta.flow_id,
                version: SnapshotVersion(meta.version),
                timestamp: meta.timestamp,
                author: meta.author,
                comments: meta.comments,
            },
            flow_contents: legacy.flow_contents.into_model(),
            parameter_contexts: BTreeMap::new(),
        })
    }
}

/// Reject graphs whose connections reference components outside the group
/// tree, or that reuse component ids.
fn validate_graph(root: &VersionedProcessGroup) -> Result<()> {
    let mut ids = std::collections::HashSet::new();
    let mut connections = Vec::new();
    collect_ids(root, &mut ids, &mut connections)?;

    for conn in connections {
        for endpoint in [&conn.source_id, &conn.destination_id] {
            if !ids.contains(endpoint.as_str()) {
                return Err(Error::Serialization(format!(
                    "connection {} references unknown component {}",
                    conn.identifier, endpoint
                )));
            }
        }
    }
    Ok(())
}

fn collect_ids<'a>(
    group: &'a VersionedProcessGroup,
    ids: &mut std::collections::HashSet<&'a str>,
    connections: &mut Vec<&'a VersionedConnection>,
) -> Result<()> {
    let own = std::iter::once(group.identifier.as_str())
        .chain(group.processors.iter().map(|p| p.identifier.as_str()));
    for id in own {
        if !ids.insert(id) {
            return Err(Error::Serialization(format!(
                "duplicate component id {} in flow contents",
                id
            )));
        }
    }
    connections.extend(group.connections.iter());
    for child in &group.process_groups {
        collect_ids(child, ids, connections)?;
    }
    Ok(())
}
