//! Structured logging conventions for the coursewire crates.
//!
//! All tracing calls use the field names defined here so log output can be
//! filtered and aggregated consistently.
//!
//! ## Log level contract
//!
//! | Level | Meaning |
//! |-------|---------|
//! | `error` | An operation failed and local state may be inconsistent |
//! | `warn`  | A remote call failed; local state is intact and the failure was recorded |
//! | `info`  | A sync operation completed, with counts and timing |
//! | `debug` | Per-batch progress |
//! | `trace` | Request and response payloads |
//!
//! Remote failures are warnings by contract: the CRM mirror is advisory and
//! never blocks local writes.

// ─── Core identification fields ──────────────────────────────────────────────

/// Top-level subsystem: "sync", "crm", or "db".
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem, e.g. "gateway" or "client".
pub const COMPONENT: &str = "component";

/// Operation being performed, e.g. "create" or "query".
pub const OPERATION: &str = "op";

// ─── Subsystems ───────────────────────────────────────────────────────────────

pub const SUBSYSTEM_SYNC: &str = "sync";
pub const SUBSYSTEM_CRM: &str = "crm";
pub const SUBSYSTEM_DB: &str = "db";

// ─── Components ───────────────────────────────────────────────────────────────

pub const COMPONENT_GATEWAY: &str = "gateway";
pub const COMPONENT_KEYWORDS: &str = "keywords";
pub const COMPONENT_ENTITIES: &str = "entities";
pub const COMPONENT_CATALOG: &str = "catalog";
pub const COMPONENT_CLIENT: &str = "client";
pub const COMPONENT_POOL: &str = "pool";

// ─── Measurement fields ───────────────────────────────────────────────────────

/// Id of the entity being operated on.
pub const ENTITY_ID: &str = "entity_id";

/// Kind of the entity being operated on.
pub const ENTITY_KIND: &str = "entity_kind";

/// Number of records in an operation.
pub const RECORD_COUNT: &str = "record_count";

/// Number of batches an operation was split into.
pub const BATCH_COUNT: &str = "batch_count";

/// Number of records the remote rejected.
pub const FAILURE_COUNT: &str = "failure_count";

/// Correlates the batches of one send operation.
pub const BATCH_ID: &str = "batch_id";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Whether the operation succeeded.
pub const SUCCESS: &str = "success";

/// Error message on failure.
pub const ERROR_MSG: &str = "error";

/// Set to true when a call exceeded the slow-call threshold.
pub const SLOW: &str = "slow";
