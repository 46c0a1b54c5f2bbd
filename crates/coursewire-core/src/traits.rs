//! Trait abstractions for storage and the CRM transport.
//!
//! The sync layer is written against these traits so storage backends and
//! the remote transport can be swapped out in tests. Production wiring
//! lives in `coursewire-db` and `coursewire-crm`.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::{
    ConnectionMarker, CreateBindingRequest, CrmCredential, EntityKind, Keyword, ObjectKind,
    QueryPage, SaveResult, WireRecord,
};

// =============================================================================
// KEYWORD STORAGE
// =============================================================================

/// Storage for keyword rows.
#[async_trait]
pub trait KeywordStore: Send + Sync {
    /// All keywords, sorted by name.
    async fn list_all(&self) -> Result<Vec<Keyword>>;

    /// Keywords whose names match exactly.
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Keyword>>;

    /// Keywords with the given ids.
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Keyword>>;

    /// Insert new keywords, returning the created rows in input order.
    async fn create_bulk(&self, names: &[String]) -> Result<Vec<Keyword>>;

    /// Record remote ids for keywords that were accepted by the CRM.
    async fn set_remote_ids(&self, ids: &[(i64, String)]) -> Result<()>;
}

/// Storage for keyword-to-entity bindings.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Ids of keywords currently bound to the entity.
    async fn bound_keyword_ids(&self, entity_id: i64, kind: EntityKind) -> Result<Vec<i64>>;

    /// Remote ids of mirrored bindings between the entity and the given
    /// keywords. Bindings without a remote id are skipped.
    async fn synced_remote_ids(
        &self,
        keyword_ids: &[i64],
        entity_id: i64,
        kind: EntityKind,
    ) -> Result<Vec<String>>;

    /// Insert bindings. Duplicates of existing bindings are ignored.
    async fn create_bulk(&self, requests: &[CreateBindingRequest]) -> Result<()>;

    /// Delete bindings between the entity and the given keywords, returning
    /// the number of rows removed.
    async fn delete_for(&self, keyword_ids: &[i64], entity_id: i64, kind: EntityKind)
        -> Result<u64>;
}

/// Lookup of remote ids for mirrored parent entities.
#[async_trait]
pub trait RemoteRefStore: Send + Sync {
    /// Remote course ids keyed by presentation id. Unmirrored courses are
    /// absent from the map.
    async fn course_remote_ids(&self, presentation_ids: &[i64]) -> Result<HashMap<i64, String>>;

    /// Remote activity ids keyed by media id. Unmirrored activities are
    /// absent from the map.
    async fn activity_remote_ids(&self, media_ids: &[i64]) -> Result<HashMap<i64, String>>;
}

// =============================================================================
// CRM BOOKKEEPING STORAGE
// =============================================================================

/// Storage for CRM login credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The configured credential set, if any.
    async fn current(&self) -> Result<Option<CrmCredential>>;

    /// Store a credential set, replacing any previous one.
    async fn store(
        &self,
        username: &str,
        password: &str,
        security_token: &str,
        host: &str,
    ) -> Result<CrmCredential>;
}

/// Storage for the installation's connection marker.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// The configured marker, if any.
    async fn current(&self) -> Result<Option<ConnectionMarker>>;

    /// Record the remote id assigned to the marker.
    async fn set_remote_id(&self, id: i64, remote_id: &str) -> Result<()>;
}

/// Write-back of remote ids onto mirrored local rows.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Record remote ids for local rows of the given kind.
    async fn set_remote_ids(&self, kind: ObjectKind, ids: &[(i64, String)]) -> Result<()>;
}

// =============================================================================
// SYNC LOG
// =============================================================================

/// Sink for sync failure reports.
///
/// Logging must never fail a sync operation, so `add` is infallible;
/// implementations swallow their own storage errors.
#[async_trait]
pub trait SyncLog: Send + Sync {
    /// Record one entry.
    async fn add(&self, kind: &str, target: &str, message: &str);
}

/// A sync log that discards all entries.
#[derive(Debug, Clone, Default)]
pub struct NoOpSyncLog;

#[async_trait]
impl SyncLog for NoOpSyncLog {
    async fn add(&self, _kind: &str, _target: &str, _message: &str) {}
}

// =============================================================================
// CRM TRANSPORT
// =============================================================================

/// An authenticated CRM session.
#[async_trait]
pub trait CrmConnection: Send + Sync {
    /// Create records, returning one result per record in input order.
    async fn create(&self, records: &[WireRecord]) -> Result<Vec<SaveResult>>;

    /// Update records, returning one result per record in input order.
    async fn update(&self, records: &[WireRecord]) -> Result<Vec<SaveResult>>;

    /// Run a query, returning the first page.
    async fn query(&self, soql: &str) -> Result<QueryPage>;

    /// Fetch the next page for a locator returned by an earlier query.
    async fn query_more(&self, locator: &str) -> Result<QueryPage>;
}

/// Factory for CRM sessions.
#[async_trait]
pub trait CrmConnector: Send + Sync {
    /// Log in with the stored credentials.
    async fn connect(&self) -> Result<Box<dyn CrmConnection>>;

    /// Log in with explicit credentials, bypassing the stored set.
    async fn connect_with(&self, credentials: &CrmCredential) -> Result<Box<dyn CrmConnection>>;
}
