//! Keyword repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use coursewire_core::{Error, Keyword, KeywordStore, Result};

/// Validate a keyword name.
///
/// Rules:
/// - Not empty after trimming
/// - Length at most 255 characters
///
/// Returns Ok(()) if valid, Err with message if invalid.
pub fn validate_keyword_name(name: &str) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("Keyword name cannot be empty".to_string());
    }
    if name.len() > 255 {
        return Err("Keyword name must be 255 characters or less".to_string());
    }
    Ok(())
}

fn keyword_from_row(row: &PgRow) -> Keyword {
    Keyword {
        id: row.get("id"),
        name: row.get("name"),
        remote_id: row.get("remote_id"),
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL implementation of KeywordStore.
#[derive(Clone)]
pub struct PgKeywordStore {
    pool: Pool<Postgres>,
}

impl PgKeywordStore {
    /// Create a new PgKeywordStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeywordStore for PgKeywordStore {
    async fn list_all(&self) -> Result<Vec<Keyword>> {
        let rows = sqlx::query(
            "SELECT id, name, remote_id, created_at FROM keyword ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(keyword_from_row).collect())
    }

    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Keyword>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, name, remote_id, created_at FROM keyword WHERE name = ANY($1)",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(keyword_from_row).collect())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Keyword>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, name, remote_id, created_at FROM keyword WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(keyword_from_row).collect())
    }

    async fn create_bulk(&self, names: &[String]) -> Result<Vec<Keyword>> {
        for name in names {
            validate_keyword_name(name).map_err(Error::InvalidInput)?;
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut created = Vec::with_capacity(names.len());

        for name in names {
            let row = sqlx::query(
                "INSERT INTO keyword (name) VALUES ($1) \
                 RETURNING id, name, remote_id, created_at",
            )
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

            created.push(keyword_from_row(&row));
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(created)
    }

    async fn set_remote_ids(&self, ids: &[(i64, String)]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for (id, remote_id) in ids {
            sqlx::query("UPDATE keyword SET remote_id = $2 WHERE id = $1")
                .bind(id)
                .bind(remote_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
