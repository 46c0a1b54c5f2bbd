//! CRM credential repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use coursewire_core::{CredentialStore, CrmCredential, Error, Result};

fn credential_from_row(row: &PgRow) -> CrmCredential {
    CrmCredential {
        id: row.get("id"),
        username: row.get("username"),
        password: row.get("password"),
        security_token: row.get("security_token"),
        host: row.get("host"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of CredentialStore.
///
/// One credential set per installation; `store` replaces any existing row.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: Pool<Postgres>,
}

impl PgCredentialStore {
    /// Create a new PgCredentialStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn current(&self) -> Result<Option<CrmCredential>> {
        let row = sqlx::query(
            "SELECT id, username, password, security_token, host, updated_at \
             FROM crm_credential ORDER BY id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(credential_from_row))
    }

    async fn store(
        &self,
        username: &str,
        password: &str,
        security_token: &str,
        host: &str,
    ) -> Result<CrmCredential> {
        if username.trim().is_empty() || host.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Username and host are required".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM crm_credential")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let row = sqlx::query(
            "INSERT INTO crm_credential (username, password, security_token, host) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, username, password, security_token, host, updated_at",
        )
        .bind(username)
        .bind(password)
        .bind(security_token)
        .bind(host)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(credential_from_row(&row))
    }
}
