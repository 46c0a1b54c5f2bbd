//! Remote id lookup for mirrored parent entities.
//!
//! Keyword bindings reference their parent records remotely: a presentation
//! binding points at the mirrored course, a media binding at the mirrored
//! activity. These lookups resolve local ids to the remote ids of those
//! parents; entities that have not been mirrored are simply absent.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use coursewire_core::{Error, RemoteRefStore, Result};

/// PostgreSQL implementation of RemoteRefStore.
#[derive(Clone)]
pub struct PgRemoteRefStore {
    pool: Pool<Postgres>,
}

impl PgRemoteRefStore {
    /// Create a new PgRemoteRefStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemoteRefStore for PgRemoteRefStore {
    async fn course_remote_ids(&self, presentation_ids: &[i64]) -> Result<HashMap<i64, String>> {
        if presentation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT presentation_id, remote_id FROM course \
             WHERE presentation_id = ANY($1) AND remote_id IS NOT NULL",
        )
        .bind(presentation_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|row| (row.get("presentation_id"), row.get("remote_id")))
            .collect())
    }

    async fn activity_remote_ids(&self, media_ids: &[i64]) -> Result<HashMap<i64, String>> {
        if media_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // An activity mirrors a media item only when its link points at the
        // media path or first slide; activities linked elsewhere are skipped.
        let rows = sqlx::query(
            "SELECT m.id AS media_id, a.remote_id \
             FROM media m \
             INNER JOIN activity a \
                ON a.media_id = m.id \
               AND (a.link = m.path OR a.link = m.first_slide) \
             WHERE m.id = ANY($1) AND a.remote_id IS NOT NULL",
        )
        .bind(media_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|row| (row.get("media_id"), row.get("remote_id")))
            .collect())
    }
}
