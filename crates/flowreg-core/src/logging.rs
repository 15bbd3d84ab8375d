//! Structured logging schema and field name constants for flowreg.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query revision conflicts and serializer dispatch
//! by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Failure that needs operator attention (unreadable payload, lost content) |
//! | WARN  | Recoverable issue (stale revision, retained revision after failed delete) |
//! | INFO  | Lifecycle events (startup), completed mutations |
//! | DEBUG | Decision points (serializer dispatch, revision checks) |
//! | TRACE | Per-item iteration (cascade deletes, lock table pruning) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "core", "db", "registry"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "revision_manager", "serializer", "coordinator", "fs_provider"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "update_revision", "serialize", "create_bucket"
pub const OPERATION: &str = "op";

/// Identity of the acting caller.
pub const USER: &str = "user";

/// Client id carried on a revision.
pub const CLIENT_ID: &str = "client_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Id of the revisioned entity being mutated.
pub const ENTITY_ID: &str = "entity_id";

/// Entity kind ("bucket", "flow", "bundle").
pub const ENTITY_KIND: &str = "entity_kind";

/// Owning bucket id.
pub const BUCKET_ID: &str = "bucket_id";

// ─── Revision fields ───────────────────────────────────────────────────────

/// Revision version presented by the caller.
pub const CLAIMED_VERSION: &str = "claimed_version";

/// Revision version held by the store.
pub const CURRENT_VERSION: &str = "current_version";

/// Revision version after a successful advance.
pub const NEW_VERSION: &str = "new_version";

// ─── Payload fields ────────────────────────────────────────────────────────

/// Data model version stamped on a serialized payload.
pub const DATA_MODEL_VERSION: &str = "data_model_version";

/// Flow snapshot sequence number.
pub const SNAPSHOT_VERSION: &str = "snapshot_version";

/// Byte length of a payload.
pub const PAYLOAD_LEN: &str = "payload_len";

/// Persistence provider name.
pub const PROVIDER: &str = "provider";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records touched by a cascade.
pub const RESULT_COUNT: &str = "result_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
