//! Keyword binding repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use coursewire_core::{BindingStore, CreateBindingRequest, EntityKind, Error, Result};

/// PostgreSQL implementation of BindingStore.
#[derive(Clone)]
pub struct PgBindingStore {
    pool: Pool<Postgres>,
}

impl PgBindingStore {
    /// Create a new PgBindingStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BindingStore for PgBindingStore {
    async fn bound_keyword_ids(&self, entity_id: i64, kind: EntityKind) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT keyword_id FROM keyword_binding \
             WHERE entity_id = $1 AND entity_kind = $2",
        )
        .bind(entity_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|row| row.get("keyword_id")).collect())
    }

    async fn synced_remote_ids(
        &self,
        keyword_ids: &[i64],
        entity_id: i64,
        kind: EntityKind,
    ) -> Result<Vec<String>> {
        if keyword_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT remote_id FROM keyword_binding \
             WHERE keyword_id = ANY($1) AND entity_id = $2 AND entity_kind = $3 \
               AND remote_id IS NOT NULL",
        )
        .bind(keyword_ids)
        .bind(entity_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|row| row.get("remote_id")).collect())
    }

    async fn create_bulk(&self, requests: &[CreateBindingRequest]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for request in requests {
            sqlx::query(
                "INSERT INTO keyword_binding (keyword_id, entity_id, entity_kind, remote_id) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(request.keyword_id)
            .bind(request.entity_id)
            .bind(request.entity_kind.as_str())
            .bind(&request.remote_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn delete_for(
        &self,
        keyword_ids: &[i64],
        entity_id: i64,
        kind: EntityKind,
    ) -> Result<u64> {
        if keyword_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "DELETE FROM keyword_binding \
             WHERE keyword_id = ANY($1) AND entity_id = $2 AND entity_kind = $3",
        )
        .bind(keyword_ids)
        .bind(entity_id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
