//! Keyword reconciliation between local storage and the CRM mirror.
//!
//! Keywords are global, named tags; bindings attach them to a parent entity
//! (media item, presentation, or conversion task). Local storage is the
//! source of truth: keyword and binding rows are written unconditionally,
//! and remote ids are filled in only for records the CRM accepted. A CRM
//! outage therefore leaves rows behind with no remote id, and a later sync
//! pass can pick them up.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument};

use coursewire_core::{
    BindingStore, CreateBindingRequest, EntityKind, KeywordChange, KeywordListing, KeywordStore,
    ObjectKind, RemoteRefStore, Result,
};

use crate::gateway::{SyncCommand, SyncGateway};
use crate::mappers::{self, BindingSubmission};

/// Keyword tagging service.
pub struct KeywordSync {
    keywords: Arc<dyn KeywordStore>,
    bindings: Arc<dyn BindingStore>,
    remote_refs: Arc<dyn RemoteRefStore>,
    gateway: Arc<SyncGateway>,
}

impl KeywordSync {
    pub fn new(
        keywords: Arc<dyn KeywordStore>,
        bindings: Arc<dyn BindingStore>,
        remote_refs: Arc<dyn RemoteRefStore>,
        gateway: Arc<SyncGateway>,
    ) -> Self {
        Self {
            keywords,
            bindings,
            remote_refs,
            gateway,
        }
    }

    /// List every keyword plus the subset bound to the given entity.
    pub async fn list_keywords(&self, entity_id: i64, kind: EntityKind) -> Result<KeywordListing> {
        let all = self.keywords.list_all().await?;
        let bound_ids: HashSet<i64> = self
            .bindings
            .bound_keyword_ids(entity_id, kind)
            .await?
            .into_iter()
            .collect();

        let bound = all
            .iter()
            .filter(|k| bound_ids.contains(&k.id))
            .cloned()
            .collect();

        Ok(KeywordListing { all, bound })
    }

    /// Apply a list of keyword edits to an entity.
    ///
    /// A change flagged both `add` and `remove` counts as an add. Additions
    /// are processed before removals, and names that are empty after
    /// trimming are skipped.
    #[instrument(
        skip(self, changes),
        fields(subsystem = "sync", component = "keywords", op = "apply_changes",
               entity_id, entity_kind = %kind, change_count = changes.len())
    )]
    pub async fn apply_keyword_changes(
        &self,
        entity_id: i64,
        kind: EntityKind,
        changes: &[KeywordChange],
    ) -> Result<()> {
        let mut to_add = Vec::new();
        let mut to_remove = Vec::new();

        for change in changes {
            if change.name.trim().is_empty() {
                continue;
            }
            if change.add {
                to_add.push(change.name.clone());
            } else if change.remove {
                to_remove.push(change.name.clone());
            }
        }

        if !to_add.is_empty() {
            self.create_or_bind_keywords(entity_id, kind, &to_add).await?;
        }
        if !to_remove.is_empty() {
            self.retire_keywords(entity_id, kind, &to_remove).await?;
        }
        Ok(())
    }

    /// Resolve names to keywords (creating missing ones) and bind them all
    /// to the entity.
    ///
    /// New keywords are created locally first, then mirrored; bindings are
    /// mirrored only when both the keyword and the entity's parent are
    /// already mirrored, but every binding is persisted locally either way.
    /// Conversion task bindings stay local; the remote schema has no parent
    /// object for them.
    #[instrument(
        skip(self, names),
        fields(subsystem = "sync", component = "keywords", op = "create_or_bind",
               entity_id, entity_kind = %kind, name_count = names.len())
    )]
    pub async fn create_or_bind_keywords(
        &self,
        entity_id: i64,
        kind: EntityKind,
        names: &[String],
    ) -> Result<()> {
        let ns = self.gateway.config().namespace.clone();

        let existing = self.keywords.find_by_names(names).await?;
        let existing_names: HashSet<&str> = existing.iter().map(|k| k.name.as_str()).collect();

        // Fresh names, deduplicated on first occurrence.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut fresh: Vec<String> = Vec::new();
        for name in names {
            if name.trim().is_empty() || existing_names.contains(name.as_str()) {
                continue;
            }
            if seen.insert(name.as_str()) {
                fresh.push(name.clone());
            }
        }

        let mut created = if fresh.is_empty() {
            Vec::new()
        } else {
            self.keywords.create_bulk(&fresh).await?
        };

        if !created.is_empty() {
            let outcome = self
                .gateway
                .send_batch(SyncCommand::Insert, &created, |k| {
                    mappers::keyword_record(&ns, k)
                })
                .await;

            if let Some(results) = outcome.results() {
                let mut accepted: Vec<(i64, String)> = Vec::new();
                for (keyword, result) in created.iter_mut().zip(results) {
                    if result.success {
                        if let Some(id) = &result.id {
                            keyword.remote_id = Some(id.clone());
                            accepted.push((keyword.id, id.clone()));
                        }
                    }
                }
                if !accepted.is_empty() {
                    self.keywords.set_remote_ids(&accepted).await?;
                }
            }
        }

        let bound: HashSet<i64> = self
            .bindings
            .bound_keyword_ids(entity_id, kind)
            .await?
            .into_iter()
            .collect();

        let mut candidates = existing;
        candidates.append(&mut created);

        let parent_remote_id = self.parent_remote_id(entity_id, kind).await?;

        let mut requests: Vec<CreateBindingRequest> = Vec::new();
        let mut submissions: Vec<BindingSubmission> = Vec::new();
        let mut slots: Vec<usize> = Vec::new();

        for keyword in candidates.iter().filter(|k| !bound.contains(&k.id)) {
            let slot = requests.len();
            requests.push(CreateBindingRequest {
                keyword_id: keyword.id,
                entity_id,
                entity_kind: kind,
                remote_id: None,
            });

            if let (Some(keyword_remote), Some(parent_remote)) =
                (&keyword.remote_id, &parent_remote_id)
            {
                submissions.push(BindingSubmission {
                    keyword_remote_id: keyword_remote.clone(),
                    activity_remote_id: (kind == EntityKind::Media)
                        .then(|| parent_remote.clone()),
                    course_remote_id: (kind == EntityKind::Presentation)
                        .then(|| parent_remote.clone()),
                });
                slots.push(slot);
            }
        }

        if !submissions.is_empty() {
            let outcome = self
                .gateway
                .send_batch(SyncCommand::Insert, &submissions, |s| {
                    mappers::keyword_binding_record(&ns, s)
                })
                .await;

            // Results align with the submitted subset, not the full
            // request list: bindings held back for missing remote ids
            // occupy no result slot.
            if let Some(results) = outcome.results() {
                for (slot, result) in slots.iter().zip(results) {
                    if result.success {
                        if let Some(id) = &result.id {
                            requests[*slot].remote_id = Some(id.clone());
                        }
                    }
                }
            }
        }

        self.bindings.create_bulk(&requests).await?;

        info!(
            subsystem = "sync",
            component = "keywords",
            op = "create_or_bind",
            entity_id,
            entity_kind = %kind,
            created = fresh.len(),
            bound = requests.len(),
            "Keywords bound"
        );
        Ok(())
    }

    /// Unbind the named keywords from the entity.
    ///
    /// Mirrored bindings are deactivated remotely on a best-effort basis;
    /// the local binding rows are deleted regardless of the remote outcome.
    /// Keyword rows themselves are never deleted. Returns the number of
    /// bindings removed.
    #[instrument(
        skip(self, names),
        fields(subsystem = "sync", component = "keywords", op = "retire",
               entity_id, entity_kind = %kind, name_count = names.len())
    )]
    pub async fn retire_keywords(
        &self,
        entity_id: i64,
        kind: EntityKind,
        names: &[String],
    ) -> Result<u64> {
        let found = self.keywords.find_by_names(names).await?;
        if found.is_empty() {
            return Ok(0);
        }
        let ids: Vec<i64> = found.iter().map(|k| k.id).collect();

        let synced = self.bindings.synced_remote_ids(&ids, entity_id, kind).await?;
        if !synced.is_empty() {
            let ns = self.gateway.config().namespace.clone();
            self.gateway
                .send_batch(SyncCommand::Update, &synced, |id| {
                    mappers::deactivation_record(&ns, ObjectKind::KeywordBinding, id)
                })
                .await;
        }

        let deleted = self.bindings.delete_for(&ids, entity_id, kind).await?;

        info!(
            subsystem = "sync",
            component = "keywords",
            op = "retire",
            entity_id,
            entity_kind = %kind,
            record_count = deleted,
            "Keywords unbound"
        );
        Ok(deleted)
    }

    async fn parent_remote_id(&self, entity_id: i64, kind: EntityKind) -> Result<Option<String>> {
        match kind {
            EntityKind::Presentation => Ok(self
                .remote_refs
                .course_remote_ids(&[entity_id])
                .await?
                .remove(&entity_id)),
            EntityKind::Media => Ok(self
                .remote_refs
                .activity_remote_ids(&[entity_id])
                .await?
                .remove(&entity_id)),
            EntityKind::ConversionTask => Ok(None),
        }
    }
}
