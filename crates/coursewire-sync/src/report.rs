//! Summary of a batch send, for logs and callers.

use coursewire_core::SaveResult;
use serde::{Deserialize, Serialize};

use crate::gateway::BatchOutcome;

/// Overall status of a batch send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every record was accepted.
    Success,
    /// Some records were accepted, some rejected.
    PartialFailure,
    /// Every record was rejected.
    Failed,
    /// Nothing was delivered (sync disabled or transport failure).
    NotSent,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
            Self::NotSent => "not_sent",
        };
        f.write_str(s)
    }
}

/// Counts and status for one batch send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Records that reached the remote (accepted or rejected).
    pub records_sent: usize,
    /// Records the remote rejected.
    pub records_failed: usize,
    /// Chunks the batch was split into.
    pub batches_total: usize,
    pub status: SyncStatus,
}

impl SyncReport {
    pub fn from_results(results: &[SaveResult], batches_total: usize) -> Self {
        let records_failed = results.iter().filter(|r| !r.success).count();
        let status = if records_failed == 0 {
            SyncStatus::Success
        } else if records_failed == results.len() {
            SyncStatus::Failed
        } else {
            SyncStatus::PartialFailure
        };
        Self {
            records_sent: results.len(),
            records_failed,
            batches_total,
            status,
        }
    }

    /// Summarize a gateway outcome, given the chunk size it was sent with.
    pub fn from_outcome(outcome: &BatchOutcome, batch_size: usize) -> Self {
        match outcome {
            BatchOutcome::Sent(results) => {
                let batches = results.len().div_ceil(batch_size.max(1));
                Self::from_results(results, batches)
            }
            BatchOutcome::NotSent => Self {
                records_sent: 0,
                records_failed: 0,
                batches_total: 0,
                status: SyncStatus::NotSent,
            },
        }
    }
}
