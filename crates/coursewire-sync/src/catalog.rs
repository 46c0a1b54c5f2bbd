//! Read side of the CRM mirror.
//!
//! Listings page through the remote query cursor until the server reports
//! the result set done, so callers always see complete lists. Records with
//! no `Id` are dropped; a missing local id marker stays `None` so callers
//! can spot records created outside the mirror.

use std::sync::Arc;

use tracing::{debug, instrument};

use coursewire_core::{
    AssignedFilter, CompletionEntry, ConnectionMarker, CrmConnection, CrmConnector, CrmCredential,
    Error, MarkerStore, ObjectKind, RemoteBindingEntry, RemoteEntry, RemoteRecord, Result,
    SyncConfig, UnassignSelection,
};
use coursewire_crm::wire::{in_list, prefixed, quote_literal};

use crate::mappers;

/// Queries mirrored records from the CRM.
pub struct RemoteCatalog {
    connector: Arc<dyn CrmConnector>,
    markers: Arc<dyn MarkerStore>,
    config: SyncConfig,
}

impl RemoteCatalog {
    pub fn new(
        connector: Arc<dyn CrmConnector>,
        markers: Arc<dyn MarkerStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            connector,
            markers,
            config,
        }
    }

    /// Mirrored users under the configured connection marker.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_users")
    )]
    pub async fn list_users(&self) -> Result<Vec<RemoteEntry>> {
        let marker = self.marker_remote_id().await?;
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, {} FROM {} WHERE {} = {}",
            prefixed(ns, "MM_Id__c"),
            ObjectKind::User.remote_name(ns),
            prefixed(ns, "Connection_String__c"),
            quote_literal(&marker),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(self.entries(records, "MM_Id__c"))
    }

    /// Mirrored courses under the configured connection marker. The local
    /// id on each entry is the presentation id.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_courses")
    )]
    pub async fn list_courses(&self) -> Result<Vec<RemoteEntry>> {
        let marker = self.marker_remote_id().await?;
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, {} FROM {} WHERE {} = {}",
            prefixed(ns, "Moodle_Course_Id__c"),
            ObjectKind::Course.remote_name(ns),
            prefixed(ns, "Connection_String__c"),
            quote_literal(&marker),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(self.entries(records, "Moodle_Course_Id__c"))
    }

    /// Mirrored sections of one course.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_sections")
    )]
    pub async fn list_sections(&self, course_remote_id: &str) -> Result<Vec<RemoteEntry>> {
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, Name, {} FROM {} WHERE {} = {}",
            prefixed(ns, "MM_Id__c"),
            ObjectKind::Section.remote_name(ns),
            prefixed(ns, "Course__c"),
            quote_literal(course_remote_id),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(self.entries(records, "MM_Id__c"))
    }

    /// Mirrored activities of one course.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_activities")
    )]
    pub async fn list_activities(&self, course_remote_id: &str) -> Result<Vec<RemoteEntry>> {
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, Name, {} FROM {} WHERE {} = {}",
            prefixed(ns, "MM_Id__c"),
            ObjectKind::Activity.remote_name(ns),
            prefixed(ns, "General__c"),
            quote_literal(course_remote_id),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(self.entries(records, "MM_Id__c"))
    }

    /// Mirrored completions of one activity.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_completions")
    )]
    pub async fn list_completions(&self, activity_remote_id: &str) -> Result<Vec<CompletionEntry>> {
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, {}, {}, {} FROM {} WHERE {} = {}",
            prefixed(ns, "MM_Id__c"),
            prefixed(ns, "Media_Manager_User__c"),
            prefixed(ns, "Inactive__c"),
            ObjectKind::Completion.remote_name(ns),
            prefixed(ns, "Activity__c"),
            quote_literal(activity_remote_id),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(self.completion_entries(records, Some(activity_remote_id)))
    }

    /// Every mirrored completion, across all activities.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_all_completions")
    )]
    pub async fn list_all_completions(&self) -> Result<Vec<CompletionEntry>> {
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, {}, {}, {}, {} FROM {}",
            prefixed(ns, "MM_Id__c"),
            prefixed(ns, "Media_Manager_User__c"),
            prefixed(ns, "Activity__c"),
            prefixed(ns, "Inactive__c"),
            ObjectKind::Completion.remote_name(ns),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(self.completion_entries(records, None))
    }

    /// Every mirrored keyword.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_keywords")
    )]
    pub async fn list_remote_keywords(&self) -> Result<Vec<RemoteEntry>> {
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, Name, {} FROM {}",
            prefixed(ns, "MM_Id__c"),
            ObjectKind::Keyword.remote_name(ns),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(self.entries(records, "MM_Id__c"))
    }

    /// Every mirrored keyword binding.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "list_keyword_bindings")
    )]
    pub async fn list_remote_keyword_bindings(&self) -> Result<Vec<RemoteBindingEntry>> {
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, {}, {}, {}, {} FROM {}",
            prefixed(ns, "MM_Id__c"),
            prefixed(ns, "Interaction_Activity__c"),
            prefixed(ns, "Presentation__c"),
            prefixed(ns, "Inactive__c"),
            ObjectKind::KeywordBinding.remote_name(ns),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;

        let local = prefixed(ns, "MM_Id__c");
        let activity = prefixed(ns, "Interaction_Activity__c");
        let course = prefixed(ns, "Presentation__c");
        let inactive = prefixed(ns, "Inactive__c");
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let remote_id = record.id.clone()?;
                Some(RemoteBindingEntry {
                    remote_id,
                    local_id: record.field_i64(&local),
                    activity_remote_id: record.field_str(&activity).map(str::to_string),
                    course_remote_id: record.field_str(&course).map(str::to_string),
                    inactive: record.field_bool(&inactive).unwrap_or(false),
                })
            })
            .collect())
    }

    /// Ids of active assignments matching the filter, scoped to the
    /// configured connection marker.
    ///
    /// The filter lists are combined with AND, so the query matches the
    /// cross product of activities, users, and cohorts, not just the
    /// combinations that were originally assigned together.
    #[instrument(
        skip(self, filter),
        fields(subsystem = "sync", component = "catalog", op = "assigned_ids")
    )]
    pub async fn assigned_remote_ids(&self, filter: &AssignedFilter) -> Result<Vec<String>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }
        let marker = self.marker_remote_id().await?;
        let ns = &self.config.namespace;

        let mut clauses = Vec::new();
        if !filter.activity_remote_ids.is_empty() {
            clauses.push(format!(
                "{} IN {}",
                prefixed(ns, "Activity__c"),
                in_list(&filter.activity_remote_ids),
            ));
        }
        if !filter.user_remote_ids.is_empty() {
            clauses.push(format!(
                "{} IN {}",
                prefixed(ns, "User__c"),
                in_list(&filter.user_remote_ids),
            ));
        }
        if !filter.cohort_remote_ids.is_empty() {
            clauses.push(format!(
                "{} IN {}",
                prefixed(ns, "Entatio__c"),
                in_list(&filter.cohort_remote_ids),
            ));
        }
        clauses.push(format!(
            "{} = {}",
            prefixed(ns, "Connection_String__c"),
            quote_literal(&marker),
        ));
        clauses.push(format!("{} = FALSE", prefixed(ns, "Inactive__c")));

        let soql = format!(
            "SELECT Id FROM {} WHERE {}",
            ObjectKind::Assignment.remote_name(ns),
            clauses.join(" AND "),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(records.into_iter().filter_map(|record| record.id).collect())
    }

    /// Ids of assignments matching any of the selections, each selection
    /// pinning a user and cohort to a set of activities. Selections with
    /// no activities are skipped.
    #[instrument(
        skip(self, selections),
        fields(subsystem = "sync", component = "catalog", op = "assigned_ids_for",
               selection_count = selections.len())
    )]
    pub async fn assigned_remote_ids_for(
        &self,
        selections: &[UnassignSelection],
    ) -> Result<Vec<String>> {
        let ns = &self.config.namespace;
        let mut groups = Vec::new();
        for selection in selections {
            if selection.activity_remote_ids.is_empty() {
                continue;
            }
            groups.push(format!(
                "({} IN {} AND {} = {} AND {} = {})",
                prefixed(ns, "Activity__c"),
                in_list(&selection.activity_remote_ids),
                prefixed(ns, "User__c"),
                quote_literal(&selection.user_remote_id),
                prefixed(ns, "Entatio__c"),
                quote_literal(&selection.cohort_remote_id),
            ));
        }
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let marker = self.marker_remote_id().await?;
        let soql = format!(
            "SELECT Id FROM {} WHERE {} = {} AND ({})",
            ObjectKind::Assignment.remote_name(ns),
            prefixed(ns, "Connection_String__c"),
            quote_literal(&marker),
            groups.join(" OR "),
        );
        let conn = self.connect().await?;
        let records = self.fetch_all(conn.as_ref(), &soql).await?;
        Ok(records.into_iter().filter_map(|record| record.id).collect())
    }

    /// Resolve the connection marker's remote id, registering the marker
    /// on the CRM if it has not been mirrored yet.
    ///
    /// An existing remote record with the marker's URL is adopted rather
    /// than duplicated.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "catalog", op = "ensure_marker")
    )]
    pub async fn ensure_connection_marker(&self) -> Result<String> {
        let marker = self.marker().await?;
        if let Some(remote_id) = marker.remote_id.clone() {
            return Ok(remote_id);
        }
        let conn = self.connect().await?;
        self.register_marker(conn.as_ref(), &marker).await
    }

    /// Like [`ensure_connection_marker`](Self::ensure_connection_marker),
    /// but logging in with explicit credentials even while sync is
    /// disabled.
    #[instrument(
        skip(self, credentials),
        fields(subsystem = "sync", component = "catalog", op = "ensure_marker_with")
    )]
    pub async fn ensure_connection_marker_with(
        &self,
        credentials: &CrmCredential,
    ) -> Result<String> {
        let marker = self.marker().await?;
        if let Some(remote_id) = marker.remote_id.clone() {
            return Ok(remote_id);
        }
        let conn = self.connector.connect_with(credentials).await?;
        self.register_marker(conn.as_ref(), &marker).await
    }

    /// Check that a credential set can log in. Explicit credentials
    /// bypass the sync flag and the stored set is never touched.
    #[instrument(
        skip(self, credentials),
        fields(subsystem = "sync", component = "catalog", op = "validate_credentials")
    )]
    pub async fn validate_credentials(&self, credentials: &CrmCredential) -> bool {
        self.connector.connect_with(credentials).await.is_ok()
    }

    async fn connect(&self) -> Result<Box<dyn CrmConnection>> {
        if !self.config.enabled {
            return Err(Error::Connect("CRM sync is disabled".to_string()));
        }
        self.connector.connect().await
    }

    /// Drain a query through its locator until the remote reports done.
    async fn fetch_all(&self, conn: &dyn CrmConnection, soql: &str) -> Result<Vec<RemoteRecord>> {
        let mut records = Vec::new();
        let mut page = conn.query(soql).await?;
        loop {
            records.append(&mut page.records);
            if page.done {
                break;
            }
            let Some(locator) = page.query_locator.take() else {
                break;
            };
            page = conn.query_more(&locator).await?;
        }
        debug!(
            subsystem = "sync",
            component = "catalog",
            record_count = records.len(),
            "Remote query drained"
        );
        Ok(records)
    }

    async fn marker(&self) -> Result<ConnectionMarker> {
        self.markers
            .current()
            .await?
            .ok_or_else(|| Error::NotFound("Connection marker is not configured".to_string()))
    }

    async fn marker_remote_id(&self) -> Result<String> {
        self.marker().await?.remote_id.ok_or_else(|| {
            Error::NotFound("Connection marker has not been mirrored".to_string())
        })
    }

    async fn register_marker(
        &self,
        conn: &dyn CrmConnection,
        marker: &ConnectionMarker,
    ) -> Result<String> {
        let ns = &self.config.namespace;
        let soql = format!(
            "SELECT Id, Name FROM {} WHERE {} = {} LIMIT 1",
            ObjectKind::ConnectionMarker.remote_name(ns),
            prefixed(ns, "Url__c"),
            quote_literal(&marker.url),
        );
        let page = conn.query(&soql).await?;
        if let Some(remote_id) = page.records.into_iter().find_map(|record| record.id) {
            self.markers.set_remote_id(marker.id, &remote_id).await?;
            return Ok(remote_id);
        }

        let record = mappers::connection_marker_record(ns, &marker.name, &marker.url);
        let results = conn.create(&[record]).await?;
        let accepted = results
            .first()
            .filter(|result| result.success)
            .and_then(|result| result.id.clone())
            .ok_or_else(|| {
                Error::Remote("Connection marker was not accepted by the remote".to_string())
            })?;
        self.markers.set_remote_id(marker.id, &accepted).await?;
        Ok(accepted)
    }

    fn entries(&self, records: Vec<RemoteRecord>, local_field: &str) -> Vec<RemoteEntry> {
        let field = prefixed(&self.config.namespace, local_field);
        records
            .into_iter()
            .filter_map(|record| {
                let remote_id = record.id.clone()?;
                Some(RemoteEntry {
                    remote_id,
                    local_id: record.field_i64(&field),
                    name: record.field_str("Name").map(str::to_string),
                })
            })
            .collect()
    }

    fn completion_entries(
        &self,
        records: Vec<RemoteRecord>,
        activity_remote_id: Option<&str>,
    ) -> Vec<CompletionEntry> {
        let ns = &self.config.namespace;
        let local = prefixed(ns, "MM_Id__c");
        let user = prefixed(ns, "Media_Manager_User__c");
        let activity = prefixed(ns, "Activity__c");
        let inactive = prefixed(ns, "Inactive__c");
        records
            .into_iter()
            .filter_map(|record| {
                let remote_id = record.id.clone()?;
                let activity_remote_id = match activity_remote_id {
                    Some(fixed) => Some(fixed.to_string()),
                    None => record.field_str(&activity).map(str::to_string),
                };
                Some(CompletionEntry {
                    remote_id,
                    local_id: record.field_i64(&local),
                    user_remote_id: record.field_str(&user).map(str::to_string),
                    activity_remote_id,
                    inactive: record.field_bool(&inactive).unwrap_or(false),
                })
            })
            .collect()
    }
}
