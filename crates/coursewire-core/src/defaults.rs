//! Default values and tunables for the sync layer.
//!
//! Single source of truth for batch sizing, the CRM namespace, and the
//! environment variables that override them. Values not listed here are
//! not configurable.

// =============================================================================
// BATCHING
// =============================================================================

/// Maximum records per CRM create or update call. Capped by the remote API;
/// larger batches are rejected wholesale.
pub const BATCH_SIZE: usize = 200;

// =============================================================================
// REMOTE SCHEMA
// =============================================================================

/// Namespace prefix of the managed package that owns the remote objects.
/// Applied to every custom object and field name on the wire.
pub const NAMESPACE_PREFIX: &str = "KMTMMP__";

/// SOAP API version used to build the login endpoint path.
pub const API_VERSION: &str = "27.0";

// =============================================================================
// TRANSPORT
// =============================================================================

/// Timeout for a single CRM HTTP call, in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// CRM calls slower than this are logged with a `slow` marker.
pub const SLOW_CALL_THRESHOLD_MS: u128 = 5_000;

// =============================================================================
// SYNC LOG
// =============================================================================

/// Log entry kind for recoverable sync failures.
pub const LOG_KIND_WARNING: &str = "warning";

/// Log entry target for the CRM subsystem.
pub const LOG_TARGET_CRM: &str = "sf";

/// Failure message recorded when the remote rejects a record without
/// giving a reason.
pub const GENERIC_FAILURE_MESSAGE: &str = "Unexpected error occurred";

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

/// Enables or disables outbound sync ("true"/"false", "1"/"0").
pub const ENV_SYNC_ENABLED: &str = "COURSEWIRE_SYNC_ENABLED";

/// Overrides the per-call batch size (clamped to 1..=200).
pub const ENV_BATCH_SIZE: &str = "COURSEWIRE_SYNC_BATCH_SIZE";

/// Overrides the remote namespace prefix.
pub const ENV_NAMESPACE: &str = "COURSEWIRE_CRM_NAMESPACE";

/// Overrides the per-call HTTP timeout in seconds.
pub const ENV_TIMEOUT: &str = "COURSEWIRE_CRM_TIMEOUT_SECS";

// =============================================================================
// SYNC CONFIGURATION
// =============================================================================

/// Runtime configuration for the sync layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// When false, no CRM calls are made; batch sends report "not sent".
    pub enabled: bool,
    /// Records per CRM call.
    pub batch_size: usize,
    /// Namespace prefix for remote object and field names.
    pub namespace: String,
    /// HTTP timeout per CRM call, in seconds.
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: BATCH_SIZE,
            namespace: NAMESPACE_PREFIX.to_string(),
            timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for unset or invalid values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(ENV_SYNC_ENABLED) {
            match val.to_lowercase().as_str() {
                "1" | "true" => config.enabled = true,
                "0" | "false" => config.enabled = false,
                _ => {
                    tracing::warn!(value = %val, "Invalid sync enabled flag, using default");
                }
            }
        }

        if let Ok(val) = std::env::var(ENV_BATCH_SIZE) {
            match val.parse::<usize>() {
                Ok(size) => config.batch_size = size.clamp(1, BATCH_SIZE),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid batch size, using default");
                }
            }
        }

        if let Ok(val) = std::env::var(ENV_NAMESPACE) {
            config.namespace = val;
        }

        if let Ok(val) = std::env::var(ENV_TIMEOUT) {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_secs = secs,
                _ => {
                    tracing::warn!(value = %val, "Invalid timeout, using default");
                }
            }
        }

        config
    }

    /// Configuration with sync disabled, for installations without a CRM.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
