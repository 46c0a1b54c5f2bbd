//! # coursewire-sync
//!
//! Sync layer mirroring courseware entities into a CRM.
//!
//! This crate provides:
//! - A generic chunked batch writer with per-record failure logging
//! - Keyword reconciliation between local storage and the remote mirror
//! - Push ops for users, courses, sections, activities, completions, and
//!   assignments, with remote-id write-back
//! - A read-side catalog over the mirrored records
//!
//! Local storage stays authoritative throughout: remote failures are
//! logged and reported, never raised against the local operation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use coursewire_core::{EntityKind, SyncConfig};
//! use coursewire_db::Database;
//! use coursewire_sync::SyncService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/coursewire").await?;
//!     let sync = SyncService::with_http(&db, SyncConfig::from_env());
//!
//!     let tags = vec!["Safety".to_string(), "Onboarding".to_string()];
//!     sync.keywords
//!         .create_or_bind_keywords(7, EntityKind::Media, &tags)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod entities;
pub mod gateway;
pub mod keywords;
pub mod mappers;
pub mod report;

// Re-export commonly used types at crate root
pub use catalog::RemoteCatalog;
pub use entities::EntitySync;
pub use gateway::{BatchOutcome, SyncCommand, SyncGateway};
pub use keywords::KeywordSync;
pub use mappers::BindingSubmission;
pub use report::{SyncReport, SyncStatus};

use std::sync::Arc;

use coursewire_core::{CrmConnector, SyncConfig};
use coursewire_crm::HttpCrmConnector;
use coursewire_db::Database;

/// The sync services bundled over one database and one connector.
pub struct SyncService {
    pub keywords: KeywordSync,
    pub entities: EntitySync,
    pub catalog: Arc<RemoteCatalog>,
    pub gateway: Arc<SyncGateway>,
}

impl SyncService {
    pub fn new(db: &Database, connector: Arc<dyn CrmConnector>, config: SyncConfig) -> Self {
        let gateway = Arc::new(SyncGateway::new(
            connector.clone(),
            Arc::new(db.sync_log.clone()),
            config.clone(),
        ));
        let catalog = Arc::new(RemoteCatalog::new(
            connector,
            Arc::new(db.markers.clone()),
            config,
        ));
        let keywords = KeywordSync::new(
            Arc::new(db.keywords.clone()),
            Arc::new(db.bindings.clone()),
            Arc::new(db.remote_refs.clone()),
            gateway.clone(),
        );
        let entities = EntitySync::new(
            gateway.clone(),
            Arc::new(db.mirror.clone()),
            catalog.clone(),
        );
        Self {
            keywords,
            entities,
            catalog,
            gateway,
        }
    }

    /// Service wired to the HTTP connector, with credentials read from
    /// the database at connect time.
    pub fn with_http(db: &Database, config: SyncConfig) -> Self {
        let connector = HttpCrmConnector::new(Arc::new(db.credentials.clone()), config.clone());
        Self::new(db, Arc::new(connector), config)
    }
}
