//! Persistent sync log implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use coursewire_core::{Error, Result, SyncLog, SyncLogEntry};

fn entry_from_row(row: &PgRow) -> SyncLogEntry {
    SyncLogEntry {
        id: row.get("id"),
        kind: row.get("kind"),
        target: row.get("target"),
        message: row.get("message"),
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL implementation of SyncLog.
///
/// `add` swallows storage errors after logging them; a broken log table
/// must not take sync operations down with it.
#[derive(Clone)]
pub struct PgSyncLog {
    pool: Pool<Postgres>,
}

impl PgSyncLog {
    /// Create a new PgSyncLog with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, kind, target, message, created_at FROM crm_sync_log \
             ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(entry_from_row).collect())
    }
}

#[async_trait]
impl SyncLog for PgSyncLog {
    async fn add(&self, kind: &str, target: &str, message: &str) {
        let result = sqlx::query(
            "INSERT INTO crm_sync_log (kind, target, message) VALUES ($1, $2, $3)",
        )
        .bind(kind)
        .bind(target)
        .bind(message)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                subsystem = "db",
                component = "sync_log",
                error = %e,
                "Failed to persist sync log entry"
            );
        }
    }
}
