//! Connection marker repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use coursewire_core::{ConnectionMarker, Error, MarkerStore, Result};

/// PostgreSQL implementation of MarkerStore.
#[derive(Clone)]
pub struct PgMarkerStore {
    pool: Pool<Postgres>,
}

impl PgMarkerStore {
    /// Create a new PgMarkerStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a marker row. Used at installation setup.
    pub async fn create(&self, name: &str, url: &str) -> Result<ConnectionMarker> {
        let row = sqlx::query(
            "INSERT INTO connection_marker (name, url) VALUES ($1, $2) \
             RETURNING id, name, url, remote_id",
        )
        .bind(name)
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ConnectionMarker {
            id: row.get("id"),
            name: row.get("name"),
            url: row.get("url"),
            remote_id: row.get("remote_id"),
        })
    }
}

#[async_trait]
impl MarkerStore for PgMarkerStore {
    async fn current(&self) -> Result<Option<ConnectionMarker>> {
        let row = sqlx::query(
            "SELECT id, name, url, remote_id FROM connection_marker ORDER BY id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| ConnectionMarker {
            id: row.get("id"),
            name: row.get("name"),
            url: row.get("url"),
            remote_id: row.get("remote_id"),
        }))
    }

    async fn set_remote_id(&self, id: i64, remote_id: &str) -> Result<()> {
        sqlx::query("UPDATE connection_marker SET remote_id = $2 WHERE id = $1")
            .bind(id)
            .bind(remote_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
