//! # coursewire-db
//!
//! PostgreSQL storage layer for coursewire.
//!
//! This crate provides:
//! - Connection pool management
//! - Store implementations for keywords, bindings, and CRM bookkeeping
//! - The persistent sync log
//!
//! ## Example
//!
//! ```rust,ignore
//! use coursewire_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/coursewire").await?;
//!
//!     let keywords = db.keywords.list_all().await?;
//!     println!("{} keywords", keywords.len());
//!     Ok(())
//! }
//! ```

pub mod bindings;
pub mod credentials;
pub mod keywords;
pub mod markers;
pub mod mirror;
pub mod pool;
pub mod remote_refs;
pub mod sync_log;

// Re-export core types
pub use coursewire_core::*;

// Re-export store implementations
pub use bindings::PgBindingStore;
pub use credentials::PgCredentialStore;
pub use keywords::{validate_keyword_name, PgKeywordStore};
pub use markers::PgMarkerStore;
pub use mirror::PgMirrorStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use remote_refs::PgRemoteRefStore;
pub use sync_log::PgSyncLog;

/// Combined database context with all stores.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Keyword store.
    pub keywords: PgKeywordStore,
    /// Keyword binding store.
    pub bindings: PgBindingStore,
    /// Remote id lookup for mirrored parents.
    pub remote_refs: PgRemoteRefStore,
    /// CRM credential store.
    pub credentials: PgCredentialStore,
    /// Connection marker store.
    pub markers: PgMarkerStore,
    /// Remote id write-back for mirrored rows.
    pub mirror: PgMirrorStore,
    /// Persistent sync log.
    pub sync_log: PgSyncLog,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            keywords: PgKeywordStore::new(pool.clone()),
            bindings: PgBindingStore::new(pool.clone()),
            remote_refs: PgRemoteRefStore::new(pool.clone()),
            credentials: PgCredentialStore::new(pool.clone()),
            markers: PgMarkerStore::new(pool.clone()),
            mirror: PgMirrorStore::new(pool.clone()),
            sync_log: PgSyncLog::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
