//! Multi-version payload serialization.
//!
//! Payloads are stamped with the data model version that wrote them. The
//! registry always writes its current version and can read every version it
//! has a serializer for. Adding a format means registering a new serializer
//! and advancing the current version; existing serializers never change.

pub mod flow;
pub mod header;
pub mod registry;

#[cfg(test)]
mod tests;

pub use flow::{flow_snapshot_serializer, FlowSnapshotSerializerV1, FlowSnapshotSerializerV2};
pub use header::{read_header, write_header, HEADER_LEN};
pub use registry::{SerializerRegistry, VersionedSerializer};
