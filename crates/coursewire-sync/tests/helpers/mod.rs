//! In-memory stores and fixtures backing the sync service tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use coursewire_core::{
    BindingStore, ConnectionMarker, CreateBindingRequest, EntityKind, Keyword, KeywordStore,
    MarkerStore, MirrorStore, ObjectKind, RemoteRefStore, Result, SyncConfig, SyncLog,
};
use coursewire_crm::MockCrmConnector;
use coursewire_sync::{EntitySync, KeywordSync, RemoteCatalog, SyncGateway};

/// Keyword store over a plain vector.
pub struct MemKeywordStore {
    rows: Mutex<Vec<Keyword>>,
    next_id: AtomicI64,
}

impl Default for MemKeywordStore {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemKeywordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a keyword row, returning it.
    pub fn seed(&self, name: &str, remote_id: Option<&str>) -> Keyword {
        let keyword = Keyword {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            remote_id: remote_id.map(str::to_string),
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(keyword.clone());
        keyword
    }

    pub fn all(&self) -> Vec<Keyword> {
        self.rows.lock().unwrap().clone()
    }

    pub fn by_name(&self, name: &str) -> Option<Keyword> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|k| k.name == name)
            .cloned()
    }
}

#[async_trait]
impl KeywordStore for MemKeywordStore {
    async fn list_all(&self) -> Result<Vec<Keyword>> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Keyword>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|k| names.contains(&k.name))
            .cloned()
            .collect())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<Keyword>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|k| ids.contains(&k.id)).cloned().collect())
    }

    async fn create_bulk(&self, names: &[String]) -> Result<Vec<Keyword>> {
        let created: Vec<Keyword> = names
            .iter()
            .map(|name| Keyword {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                name: name.clone(),
                remote_id: None,
                created_at: Utc::now(),
            })
            .collect();
        self.rows.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }

    async fn set_remote_ids(&self, ids: &[(i64, String)]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for (id, remote_id) in ids {
            if let Some(row) = rows.iter_mut().find(|k| k.id == *id) {
                row.remote_id = Some(remote_id.clone());
            }
        }
        Ok(())
    }
}

/// Binding store over a plain vector.
#[derive(Default)]
pub struct MemBindingStore {
    rows: Mutex<Vec<CreateBindingRequest>>,
}

impl MemBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(
        &self,
        keyword_id: i64,
        entity_id: i64,
        kind: EntityKind,
        remote_id: Option<&str>,
    ) {
        self.rows.lock().unwrap().push(CreateBindingRequest {
            keyword_id,
            entity_id,
            entity_kind: kind,
            remote_id: remote_id.map(str::to_string),
        });
    }

    pub fn all(&self) -> Vec<CreateBindingRequest> {
        self.rows.lock().unwrap().clone()
    }

    pub fn for_entity(&self, entity_id: i64, kind: EntityKind) -> Vec<CreateBindingRequest> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.entity_id == entity_id && b.entity_kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BindingStore for MemBindingStore {
    async fn bound_keyword_ids(&self, entity_id: i64, kind: EntityKind) -> Result<Vec<i64>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.entity_id == entity_id && b.entity_kind == kind)
            .map(|b| b.keyword_id)
            .collect())
    }

    async fn synced_remote_ids(
        &self,
        keyword_ids: &[i64],
        entity_id: i64,
        kind: EntityKind,
    ) -> Result<Vec<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|b| {
                b.entity_id == entity_id
                    && b.entity_kind == kind
                    && keyword_ids.contains(&b.keyword_id)
            })
            .filter_map(|b| b.remote_id.clone())
            .collect())
    }

    async fn create_bulk(&self, requests: &[CreateBindingRequest]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for request in requests {
            let duplicate = rows.iter().any(|b| {
                b.keyword_id == request.keyword_id
                    && b.entity_id == request.entity_id
                    && b.entity_kind == request.entity_kind
            });
            if !duplicate {
                rows.push(request.clone());
            }
        }
        Ok(())
    }

    async fn delete_for(
        &self,
        keyword_ids: &[i64],
        entity_id: i64,
        kind: EntityKind,
    ) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|b| {
            !(b.entity_id == entity_id
                && b.entity_kind == kind
                && keyword_ids.contains(&b.keyword_id))
        });
        Ok((before - rows.len()) as u64)
    }
}

/// Remote parent lookup over two maps.
#[derive(Default)]
pub struct MemRemoteRefStore {
    courses: Mutex<HashMap<i64, String>>,
    activities: Mutex<HashMap<i64, String>>,
}

impl MemRemoteRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_course(&self, presentation_id: i64, remote_id: &str) {
        self.courses
            .lock()
            .unwrap()
            .insert(presentation_id, remote_id.to_string());
    }

    pub fn set_activity(&self, media_id: i64, remote_id: &str) {
        self.activities
            .lock()
            .unwrap()
            .insert(media_id, remote_id.to_string());
    }
}

#[async_trait]
impl RemoteRefStore for MemRemoteRefStore {
    async fn course_remote_ids(&self, presentation_ids: &[i64]) -> Result<HashMap<i64, String>> {
        let map = self.courses.lock().unwrap();
        Ok(presentation_ids
            .iter()
            .filter_map(|id| map.get(id).map(|remote| (*id, remote.clone())))
            .collect())
    }

    async fn activity_remote_ids(&self, media_ids: &[i64]) -> Result<HashMap<i64, String>> {
        let map = self.activities.lock().unwrap();
        Ok(media_ids
            .iter()
            .filter_map(|id| map.get(id).map(|remote| (*id, remote.clone())))
            .collect())
    }
}

/// Marker store holding at most one marker.
pub struct MemMarkerStore {
    marker: Mutex<Option<ConnectionMarker>>,
}

impl MemMarkerStore {
    /// A store with no marker configured.
    pub fn empty() -> Self {
        Self {
            marker: Mutex::new(None),
        }
    }

    /// A store holding one marker, optionally already mirrored.
    pub fn with_marker(name: &str, url: &str, remote_id: Option<&str>) -> Self {
        Self {
            marker: Mutex::new(Some(ConnectionMarker {
                id: 1,
                name: name.to_string(),
                url: url.to_string(),
                remote_id: remote_id.map(str::to_string),
            })),
        }
    }

    pub fn current_remote_id(&self) -> Option<String> {
        self.marker
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|m| m.remote_id.clone())
    }
}

#[async_trait]
impl MarkerStore for MemMarkerStore {
    async fn current(&self) -> Result<Option<ConnectionMarker>> {
        Ok(self.marker.lock().unwrap().clone())
    }

    async fn set_remote_id(&self, id: i64, remote_id: &str) -> Result<()> {
        let mut marker = self.marker.lock().unwrap();
        if let Some(m) = marker.as_mut() {
            if m.id == id {
                m.remote_id = Some(remote_id.to_string());
            }
        }
        Ok(())
    }
}

/// Mirror store recording every write-back.
#[derive(Default)]
pub struct MemMirrorStore {
    written: Mutex<Vec<(ObjectKind, i64, String)>>,
}

impl MemMirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<(ObjectKind, i64, String)> {
        self.written.lock().unwrap().clone()
    }

    pub fn for_kind(&self, kind: ObjectKind) -> Vec<(i64, String)> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, id, remote)| (*id, remote.clone()))
            .collect()
    }
}

#[async_trait]
impl MirrorStore for MemMirrorStore {
    async fn set_remote_ids(&self, kind: ObjectKind, ids: &[(i64, String)]) -> Result<()> {
        let mut written = self.written.lock().unwrap();
        for (id, remote_id) in ids {
            written.push((kind, *id, remote_id.clone()));
        }
        Ok(())
    }
}

/// Sync log recording entries for assertion.
#[derive(Default)]
pub struct RecordingSyncLog {
    entries: Mutex<Vec<(String, String, String)>>,
}

impl RecordingSyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, String, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl SyncLog for RecordingSyncLog {
    async fn add(&self, kind: &str, target: &str, message: &str) {
        self.entries.lock().unwrap().push((
            kind.to_string(),
            target.to_string(),
            message.to_string(),
        ));
    }
}

/// A keyword sync service over in-memory stores, with every collaborator
/// kept for assertion.
pub struct KeywordFixture {
    pub service: KeywordSync,
    pub keywords: Arc<MemKeywordStore>,
    pub bindings: Arc<MemBindingStore>,
    pub remote_refs: Arc<MemRemoteRefStore>,
    pub mock: MockCrmConnector,
    pub log: Arc<RecordingSyncLog>,
}

pub fn keyword_fixture() -> KeywordFixture {
    keyword_fixture_with(SyncConfig::default())
}

pub fn keyword_fixture_with(config: SyncConfig) -> KeywordFixture {
    let keywords = Arc::new(MemKeywordStore::new());
    let bindings = Arc::new(MemBindingStore::new());
    let remote_refs = Arc::new(MemRemoteRefStore::new());
    let mock = MockCrmConnector::new();
    let log = Arc::new(RecordingSyncLog::new());
    let gateway = Arc::new(SyncGateway::new(Arc::new(mock.clone()), log.clone(), config));
    let service = KeywordSync::new(
        keywords.clone(),
        bindings.clone(),
        remote_refs.clone(),
        gateway,
    );
    KeywordFixture {
        service,
        keywords,
        bindings,
        remote_refs,
        mock,
        log,
    }
}

/// An entity sync service over in-memory stores.
pub struct EntityFixture {
    pub service: EntitySync,
    pub catalog: Arc<RemoteCatalog>,
    pub mirror: Arc<MemMirrorStore>,
    pub markers: Arc<MemMarkerStore>,
    pub mock: MockCrmConnector,
    pub log: Arc<RecordingSyncLog>,
}

pub fn entity_fixture(markers: MemMarkerStore) -> EntityFixture {
    entity_fixture_with(markers, SyncConfig::default())
}

pub fn entity_fixture_with(markers: MemMarkerStore, config: SyncConfig) -> EntityFixture {
    let mirror = Arc::new(MemMirrorStore::new());
    let markers = Arc::new(markers);
    let mock = MockCrmConnector::new();
    let log = Arc::new(RecordingSyncLog::new());
    let gateway = Arc::new(SyncGateway::new(
        Arc::new(mock.clone()),
        log.clone(),
        config.clone(),
    ));
    let catalog = Arc::new(RemoteCatalog::new(
        Arc::new(mock.clone()),
        markers.clone(),
        config,
    ));
    let service = EntitySync::new(gateway, mirror.clone(), catalog.clone());
    EntityFixture {
        service,
        catalog,
        mirror,
        markers,
        mock,
        log,
    }
}
