//! Centralized default constants for flowreg.
//!
//! Every crate references these constants instead of defining its own magic
//! numbers. Place new constants in the matching section.

// =============================================================================
// REVISIONS
// =============================================================================

/// Version assigned to a revision when its entity is first created.
pub const INITIAL_REVISION_VERSION: u64 = 0;

/// Passes a bucket delete makes over its children before giving up on
/// children created while it runs.
pub const BUCKET_DELETE_PASSES: usize = 3;

// =============================================================================
// SERIALIZATION
// =============================================================================

/// Length in bytes of the magic header that prefixes every versioned payload.
pub const HEADER_MAGIC_LEN: usize = 5;

/// Length in bytes of the big-endian data model version after the magic.
pub const HEADER_VERSION_LEN: usize = 4;

/// Magic header for flow snapshot payloads.
pub const FLOW_SNAPSHOT_MAGIC: &[u8; HEADER_MAGIC_LEN] = b"Flows";

/// Data model version written for new flow snapshots.
pub const CURRENT_FLOW_DATA_MODEL_VERSION: u32 = 2;

// =============================================================================
// FLOW SNAPSHOTS
// =============================================================================

/// Sequence number of the first snapshot of any flow.
pub const FIRST_SNAPSHOT_VERSION: u32 = 1;

// =============================================================================
// VALIDATION
// =============================================================================

/// Maximum length of bucket, flow and bundle names.
pub const MAX_NAME_LEN: usize = 1000;

/// Maximum length of free-text descriptions and comments.
pub const MAX_DESCRIPTION_LEN: usize = 4096;

// =============================================================================
// STORAGE
// =============================================================================

/// Default root directory of the filesystem persistence provider.
pub const FILESYSTEM_STORAGE_DIR: &str = "./flow_storage";

/// File extension of persisted content blobs.
pub const CONTENT_FILE_EXTENSION: &str = "snapshot";
