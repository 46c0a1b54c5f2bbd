//! Generic chunked batch writer for the CRM mirror.
//!
//! Callers hand over a list of domain records plus a record-to-wire mapping
//! function. The gateway splits the records into fixed-size chunks, sends
//! each chunk, and concatenates the per-record results in input order so
//! callers can zip them back onto their records without correlation ids.
//!
//! Remote failures never surface as errors here. A connection or transport
//! failure makes the whole call report [`BatchOutcome::NotSent`]; per-record
//! rejections are carried in the results and recorded in the sync log.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use coursewire_core::defaults::{GENERIC_FAILURE_MESSAGE, LOG_KIND_WARNING, LOG_TARGET_CRM};
use coursewire_core::{CrmConnector, SaveResult, SyncConfig, SyncLog, WireRecord};

use crate::report::SyncReport;

/// Which write operation to perform remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    Insert,
    Update,
}

impl SyncCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for SyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a batch send.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every chunk was delivered; one result per input record, in input
    /// order. Individual records may still have been rejected.
    Sent(Vec<SaveResult>),
    /// Nothing usable was delivered: sync is disabled, the connection
    /// failed, or a chunk hit a transport error. Results from chunks sent
    /// before an abort are discarded; their remote side effects are not
    /// rolled back.
    NotSent,
}

impl BatchOutcome {
    /// Per-record results when the batch was sent.
    pub fn results(&self) -> Option<&[SaveResult]> {
        match self {
            Self::Sent(results) => Some(results),
            Self::NotSent => None,
        }
    }

    pub fn was_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Batch upsert engine in front of the CRM transport.
pub struct SyncGateway {
    connector: Arc<dyn CrmConnector>,
    log: Arc<dyn SyncLog>,
    config: SyncConfig,
}

impl SyncGateway {
    pub fn new(connector: Arc<dyn CrmConnector>, log: Arc<dyn SyncLog>, config: SyncConfig) -> Self {
        Self {
            connector,
            log,
            config,
        }
    }

    /// The configuration this gateway was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Record a sync warning on behalf of a caller.
    pub async fn log_warning(&self, message: &str) {
        self.log.add(LOG_KIND_WARNING, LOG_TARGET_CRM, message).await;
    }

    /// Send records to the CRM in fixed-size chunks.
    ///
    /// `to_wire` maps each record to its wire shape. An empty input reports
    /// sent without touching the transport.
    pub async fn send_batch<T, F>(
        &self,
        command: SyncCommand,
        records: &[T],
        to_wire: F,
    ) -> BatchOutcome
    where
        T: Serialize + Sync,
        F: Fn(&T) -> WireRecord + Send,
    {
        if !self.config.enabled {
            debug!(
                subsystem = "sync",
                component = "gateway",
                op = command.as_str(),
                record_count = records.len(),
                "Sync disabled, batch not sent"
            );
            return BatchOutcome::NotSent;
        }
        if records.is_empty() {
            return BatchOutcome::Sent(Vec::new());
        }

        let start = Instant::now();
        let batch_id = Uuid::now_v7();
        let wire: Vec<WireRecord> = records.iter().map(&to_wire).collect();

        let connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(
                    subsystem = "sync",
                    component = "gateway",
                    op = command.as_str(),
                    batch_id = %batch_id,
                    error = %e,
                    "CRM connection failed, batch not sent"
                );
                self.log
                    .add(
                        LOG_KIND_WARNING,
                        LOG_TARGET_CRM,
                        &format!("Connection failed: {}", e),
                    )
                    .await;
                return BatchOutcome::NotSent;
            }
        };

        let chunk_size = self.config.batch_size.max(1);
        let batch_count = wire.len().div_ceil(chunk_size);
        let mut results: Vec<SaveResult> = Vec::with_capacity(wire.len());

        for (index, chunk) in wire.chunks(chunk_size).enumerate() {
            debug!(
                subsystem = "sync",
                component = "gateway",
                op = command.as_str(),
                batch_id = %batch_id,
                chunk = index + 1,
                batch_count,
                record_count = chunk.len(),
                "Sending chunk"
            );

            let sent = match command {
                SyncCommand::Insert => connection.create(chunk).await,
                SyncCommand::Update => connection.update(chunk).await,
            };

            match sent {
                Ok(mut chunk_results) => results.append(&mut chunk_results),
                Err(e) => {
                    warn!(
                        subsystem = "sync",
                        component = "gateway",
                        op = command.as_str(),
                        batch_id = %batch_id,
                        chunk = index + 1,
                        error = %e,
                        "CRM transport error, batch aborted"
                    );
                    self.log
                        .add(
                            LOG_KIND_WARNING,
                            LOG_TARGET_CRM,
                            &format!("{} failed: {}", command, e),
                        )
                        .await;
                    return BatchOutcome::NotSent;
                }
            }
        }

        self.record_failures(&results, records).await;

        let report = SyncReport::from_results(&results, batch_count);
        info!(
            subsystem = "sync",
            component = "gateway",
            op = command.as_str(),
            batch_id = %batch_id,
            record_count = report.records_sent,
            batch_count = report.batches_total,
            failure_count = report.records_failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "CRM batch complete"
        );

        BatchOutcome::Sent(results)
    }

    /// Write one sync log entry per rejected record. The entry carries the
    /// remote's messages plus a dump of the submitted records for replay.
    async fn record_failures<T: Serialize>(&self, results: &[SaveResult], records: &[T]) {
        if results.iter().all(|r| r.success) {
            return;
        }

        let dump = serde_json::to_string(records).unwrap_or_else(|_| "[]".to_string());

        for result in results.iter().filter(|r| !r.success) {
            let message = if result.errors.is_empty() {
                GENERIC_FAILURE_MESSAGE.to_string()
            } else {
                result.errors.join("; ")
            };
            self.log
                .add(
                    LOG_KIND_WARNING,
                    LOG_TARGET_CRM,
                    &format!("{} :: {}", message, dump),
                )
                .await;
        }
    }
}
