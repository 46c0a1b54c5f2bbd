//! Write side of the CRM mirror for courseware entities.
//!
//! Each push op maps already-loaded local rows to wire records, sends them
//! through the gateway, and writes accepted remote ids back onto the local
//! rows. Remote failures are logged and reported as [`BatchOutcome::NotSent`];
//! only local failures (database, missing configuration) surface as errors.
//!
//! Users, courses, and assignments carry the connection marker so several
//! installations can share one CRM organization. Pushing any of those
//! registers the marker remotely first when it has not been mirrored yet.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{instrument, warn};

use coursewire_core::{
    ActivityPush, ActivityRename, AssignedFilter, AssignmentPush, CompletionPush, CompletionStatus,
    CompletionUpdate, CoursePush, Error, MirrorStore, ObjectKind, Result, SectionPush,
    UnassignSelection, UserPush,
};

use crate::catalog::RemoteCatalog;
use crate::gateway::{BatchOutcome, SyncCommand, SyncGateway};
use crate::mappers;

/// Pushes local entity state into the CRM mirror.
pub struct EntitySync {
    gateway: Arc<SyncGateway>,
    mirror: Arc<dyn MirrorStore>,
    catalog: Arc<RemoteCatalog>,
}

/// Cohort pending remote creation.
#[derive(Debug, Clone, Serialize)]
struct CohortSubmission {
    cohort_id: i64,
    name: String,
}

impl EntitySync {
    pub fn new(
        gateway: Arc<SyncGateway>,
        mirror: Arc<dyn MirrorStore>,
        catalog: Arc<RemoteCatalog>,
    ) -> Self {
        Self {
            gateway,
            mirror,
            catalog,
        }
    }

    /// Mirror users remotely and record their remote ids.
    #[instrument(
        skip(self, users),
        fields(subsystem = "sync", component = "entities", op = "push_users",
               record_count = users.len())
    )]
    pub async fn push_users(&self, users: &[UserPush]) -> Result<BatchOutcome> {
        if users.is_empty() {
            return Ok(BatchOutcome::Sent(Vec::new()));
        }
        if !self.gateway.config().enabled {
            return Ok(BatchOutcome::NotSent);
        }
        let Some(marker) = self.marker_for_push().await? else {
            return Ok(BatchOutcome::NotSent);
        };
        let ns = self.gateway.config().namespace.clone();

        let outcome = self
            .gateway
            .send_batch(SyncCommand::Insert, users, |user| {
                mappers::user_record(&ns, user, &marker)
            })
            .await;

        let keys: Vec<i64> = users.iter().map(|user| user.user_id).collect();
        self.write_back(ObjectKind::User, &keys, &outcome).await?;
        Ok(outcome)
    }

    /// Push profile changes for users that are already mirrored. Users
    /// with no remote id are skipped.
    #[instrument(
        skip(self, users),
        fields(subsystem = "sync", component = "entities", op = "update_users",
               record_count = users.len())
    )]
    pub async fn update_users(&self, users: &[UserPush]) -> BatchOutcome {
        let mirrored: Vec<UserPush> = users
            .iter()
            .filter(|user| user.remote_id.is_some())
            .cloned()
            .collect();
        let ns = self.gateway.config().namespace.clone();
        self.gateway
            .send_batch(SyncCommand::Update, &mirrored, |user| {
                mappers::user_update_record(&ns, user)
            })
            .await
    }

    /// Mirror a course remotely, returning the assigned remote id.
    #[instrument(
        skip(self, course),
        fields(subsystem = "sync", component = "entities", op = "push_course",
               entity_id = course.course_id)
    )]
    pub async fn push_course(&self, course: &CoursePush) -> Result<Option<String>> {
        if !self.gateway.config().enabled {
            return Ok(None);
        }
        let Some(marker) = self.marker_for_push().await? else {
            return Ok(None);
        };
        let ns = self.gateway.config().namespace.clone();

        let outcome = self
            .gateway
            .send_batch(SyncCommand::Insert, std::slice::from_ref(course), |c| {
                mappers::course_record(&ns, c, &marker)
            })
            .await;

        let remote_id = first_accepted_id(&outcome);
        if let Some(id) = &remote_id {
            self.mirror
                .set_remote_ids(ObjectKind::Course, &[(course.course_id, id.clone())])
                .await?;
        }
        Ok(remote_id)
    }

    /// Push changes for an already-mirrored course.
    #[instrument(
        skip(self, course),
        fields(subsystem = "sync", component = "entities", op = "update_course",
               entity_id = course.course_id)
    )]
    pub async fn update_course(&self, course: &CoursePush) -> Result<BatchOutcome> {
        if course.remote_id.is_none() {
            return Err(Error::InvalidInput("Course has not been mirrored".to_string()));
        }
        if !self.gateway.config().enabled {
            return Ok(BatchOutcome::NotSent);
        }
        let Some(marker) = self.marker_for_push().await? else {
            return Ok(BatchOutcome::NotSent);
        };
        let ns = self.gateway.config().namespace.clone();
        Ok(self
            .gateway
            .send_batch(SyncCommand::Update, std::slice::from_ref(course), |c| {
                mappers::course_update_record(&ns, c, &marker)
            })
            .await)
    }

    /// Mirror a section remotely, returning the assigned remote id.
    #[instrument(
        skip(self, section),
        fields(subsystem = "sync", component = "entities", op = "push_section",
               entity_id = section.section_id)
    )]
    pub async fn push_section(&self, section: &SectionPush) -> Result<Option<String>> {
        let ns = self.gateway.config().namespace.clone();
        let outcome = self
            .gateway
            .send_batch(SyncCommand::Insert, std::slice::from_ref(section), |s| {
                mappers::section_record(&ns, s)
            })
            .await;

        let remote_id = first_accepted_id(&outcome);
        if let Some(id) = &remote_id {
            self.mirror
                .set_remote_ids(ObjectKind::Section, &[(section.section_id, id.clone())])
                .await?;
        }
        Ok(remote_id)
    }

    /// Rename an already-mirrored section.
    #[instrument(
        skip(self, section),
        fields(subsystem = "sync", component = "entities", op = "update_section",
               entity_id = section.section_id)
    )]
    pub async fn update_section(&self, section: &SectionPush) -> Result<BatchOutcome> {
        if section.remote_id.is_none() {
            return Err(Error::InvalidInput("Section has not been mirrored".to_string()));
        }
        let ns = self.gateway.config().namespace.clone();
        Ok(self
            .gateway
            .send_batch(SyncCommand::Update, std::slice::from_ref(section), |s| {
                mappers::section_update_record(&ns, s)
            })
            .await)
    }

    /// Mirror activities remotely and record their remote ids.
    #[instrument(
        skip(self, activities),
        fields(subsystem = "sync", component = "entities", op = "push_activities",
               record_count = activities.len())
    )]
    pub async fn push_activities(&self, activities: &[ActivityPush]) -> Result<BatchOutcome> {
        let ns = self.gateway.config().namespace.clone();
        let outcome = self
            .gateway
            .send_batch(SyncCommand::Insert, activities, |activity| {
                mappers::activity_record(&ns, activity)
            })
            .await;

        let keys: Vec<i64> = activities
            .iter()
            .map(|activity| activity.activity_id)
            .collect();
        self.write_back(ObjectKind::Activity, &keys, &outcome).await?;
        Ok(outcome)
    }

    /// Push new names for already-mirrored activities.
    #[instrument(
        skip(self, renames),
        fields(subsystem = "sync", component = "entities", op = "rename_activities",
               record_count = renames.len())
    )]
    pub async fn rename_activities(&self, renames: &[ActivityRename]) -> BatchOutcome {
        let ns = self.gateway.config().namespace.clone();
        self.gateway
            .send_batch(SyncCommand::Update, renames, |rename| {
                mappers::activity_name_record(&ns, rename)
            })
            .await
    }

    /// Mirror completions remotely and record their remote ids.
    #[instrument(
        skip(self, completions),
        fields(subsystem = "sync", component = "entities", op = "push_completions",
               record_count = completions.len())
    )]
    pub async fn push_completions(&self, completions: &[CompletionPush]) -> Result<BatchOutcome> {
        let ns = self.gateway.config().namespace.clone();
        let outcome = self
            .gateway
            .send_batch(SyncCommand::Insert, completions, |completion| {
                mappers::completion_record(&ns, completion)
            })
            .await;

        let keys: Vec<i64> = completions
            .iter()
            .map(|completion| completion.completion_id)
            .collect();
        self.write_back(ObjectKind::Completion, &keys, &outcome).await?;
        Ok(outcome)
    }

    /// Push completion state changes for already-mirrored completions.
    #[instrument(
        skip(self, updates),
        fields(subsystem = "sync", component = "entities", op = "set_completed",
               record_count = updates.len())
    )]
    pub async fn set_completed(&self, updates: &[CompletionUpdate]) -> BatchOutcome {
        let ns = self.gateway.config().namespace.clone();
        self.gateway
            .send_batch(SyncCommand::Update, updates, |update| {
                mappers::completion_update_record(&ns, update)
            })
            .await
    }

    /// Push active/inactive flips for already-mirrored completions.
    #[instrument(
        skip(self, statuses),
        fields(subsystem = "sync", component = "entities", op = "set_completion_status",
               record_count = statuses.len())
    )]
    pub async fn set_completion_status(&self, statuses: &[CompletionStatus]) -> BatchOutcome {
        let ns = self.gateway.config().namespace.clone();
        self.gateway
            .send_batch(SyncCommand::Update, statuses, |status| {
                mappers::completion_status_record(&ns, status)
            })
            .await
    }

    /// Mark mirrored records of one kind inactive. Remote records are
    /// never deleted, only flagged.
    #[instrument(
        skip(self, remote_ids),
        fields(subsystem = "sync", component = "entities", op = "deactivate",
               entity_kind = ?kind, record_count = remote_ids.len())
    )]
    pub async fn deactivate(&self, kind: ObjectKind, remote_ids: &[String]) -> BatchOutcome {
        let ns = self.gateway.config().namespace.clone();
        self.gateway
            .send_batch(SyncCommand::Update, remote_ids, |remote_id| {
                mappers::deactivation_record(&ns, kind, remote_id)
            })
            .await
    }

    /// Mirror assignments remotely, creating missing cohorts on the fly.
    ///
    /// With `delete_duplicates`, active remote assignments matching the
    /// pushed activities, users, and cohorts are deactivated before the
    /// insert. The sweep and the insert are separate remote calls, so a
    /// concurrent push can interleave between them.
    #[instrument(
        skip(self, assignments),
        fields(subsystem = "sync", component = "entities", op = "push_assignments",
               record_count = assignments.len(), delete_duplicates)
    )]
    pub async fn push_assignments(
        &self,
        assignments: &[AssignmentPush],
        delete_duplicates: bool,
    ) -> Result<BatchOutcome> {
        if assignments.is_empty() {
            return Ok(BatchOutcome::Sent(Vec::new()));
        }
        if !self.gateway.config().enabled {
            return Ok(BatchOutcome::NotSent);
        }
        let Some(marker) = self.marker_for_push().await? else {
            return Ok(BatchOutcome::NotSent);
        };
        let ns = self.gateway.config().namespace.clone();

        let mut assignments = assignments.to_vec();
        self.ensure_cohorts(&ns, &mut assignments).await?;

        if delete_duplicates {
            if let Err(error) = self.sweep_duplicates(&assignments).await {
                self.swallow_remote("Assignment sweep failed", error).await?;
                return Ok(BatchOutcome::NotSent);
            }
        }

        Ok(self
            .gateway
            .send_batch(SyncCommand::Insert, &assignments, |assignment| {
                mappers::assignment_record(&ns, assignment, &marker)
            })
            .await)
    }

    /// Mark the remote assignments matching the selections unassigned.
    #[instrument(
        skip(self, selections),
        fields(subsystem = "sync", component = "entities", op = "unassign",
               selection_count = selections.len())
    )]
    pub async fn unassign(&self, selections: &[UnassignSelection]) -> Result<BatchOutcome> {
        if !self.gateway.config().enabled {
            return Ok(BatchOutcome::NotSent);
        }
        let ids = match self.catalog.assigned_remote_ids_for(selections).await {
            Ok(ids) => ids,
            Err(error) => {
                self.swallow_remote("Assignment lookup failed", error).await?;
                return Ok(BatchOutcome::NotSent);
            }
        };
        if ids.is_empty() {
            return Ok(BatchOutcome::Sent(Vec::new()));
        }
        let ns = self.gateway.config().namespace.clone();
        Ok(self
            .gateway
            .send_batch(SyncCommand::Update, &ids, |remote_id| {
                mappers::unassign_record(&ns, remote_id)
            })
            .await)
    }

    /// Rename an already-mirrored cohort.
    #[instrument(
        skip(self, remote_id, name),
        fields(subsystem = "sync", component = "entities", op = "rename_cohort")
    )]
    pub async fn rename_cohort(&self, remote_id: &str, name: &str) -> BatchOutcome {
        let ns = self.gateway.config().namespace.clone();
        let record = (remote_id.to_string(), name.to_string());
        self.gateway
            .send_batch(
                SyncCommand::Update,
                std::slice::from_ref(&record),
                |(id, name)| mappers::cohort_rename_record(&ns, id, name),
            )
            .await
    }

    /// Create remote cohorts for assignments whose cohort has no remote
    /// id yet, recording the new ids and filling them into the batch.
    async fn ensure_cohorts(&self, ns: &str, assignments: &mut [AssignmentPush]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut missing: Vec<CohortSubmission> = Vec::new();
        for assignment in assignments.iter() {
            if assignment.cohort_remote_id.is_some() {
                continue;
            }
            if seen.insert(assignment.cohort_id) {
                missing.push(CohortSubmission {
                    cohort_id: assignment.cohort_id,
                    name: assignment.cohort_name.clone(),
                });
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let outcome = self
            .gateway
            .send_batch(SyncCommand::Insert, &missing, |cohort| {
                mappers::cohort_record(ns, &cohort.name)
            })
            .await;
        let Some(results) = outcome.results() else {
            return Ok(());
        };

        let mut assigned: HashMap<i64, String> = HashMap::new();
        let mut accepted: Vec<(i64, String)> = Vec::new();
        for (cohort, result) in missing.iter().zip(results) {
            if result.success {
                if let Some(id) = &result.id {
                    assigned.insert(cohort.cohort_id, id.clone());
                    accepted.push((cohort.cohort_id, id.clone()));
                }
            }
        }
        if !accepted.is_empty() {
            self.mirror
                .set_remote_ids(ObjectKind::Cohort, &accepted)
                .await?;
        }
        for assignment in assignments.iter_mut() {
            if assignment.cohort_remote_id.is_none() {
                if let Some(id) = assigned.get(&assignment.cohort_id) {
                    assignment.cohort_remote_id = Some(id.clone());
                }
            }
        }
        Ok(())
    }

    /// Deactivate active remote assignments matching the batch. Aborts
    /// with an error when the lookup or the deactivation does not go
    /// through, so the caller skips the insert instead of duplicating.
    async fn sweep_duplicates(&self, assignments: &[AssignmentPush]) -> Result<()> {
        let mut filter = AssignedFilter::default();
        let mut activities = HashSet::new();
        let mut users = HashSet::new();
        let mut cohorts = HashSet::new();
        for assignment in assignments {
            if activities.insert(assignment.activity_remote_id.as_str()) {
                filter
                    .activity_remote_ids
                    .push(assignment.activity_remote_id.clone());
            }
            if users.insert(assignment.user_remote_id.as_str()) {
                filter
                    .user_remote_ids
                    .push(assignment.user_remote_id.clone());
            }
            if let Some(cohort) = &assignment.cohort_remote_id {
                if cohorts.insert(cohort.as_str()) {
                    filter.cohort_remote_ids.push(cohort.clone());
                }
            }
        }

        let existing = self.catalog.assigned_remote_ids(&filter).await?;
        if existing.is_empty() {
            return Ok(());
        }
        let outcome = self.deactivate(ObjectKind::Assignment, &existing).await;
        if !outcome.was_sent() {
            return Err(Error::Remote(
                "Assignment deactivation was not sent".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the connection marker, registering it remotely if needed.
    /// Remote failures are logged and collapse to `None`; local failures
    /// surface as errors.
    async fn marker_for_push(&self) -> Result<Option<String>> {
        match self.catalog.ensure_connection_marker().await {
            Ok(remote_id) => Ok(Some(remote_id)),
            Err(error) => {
                self.swallow_remote("Connection marker unavailable", error)
                    .await?;
                Ok(None)
            }
        }
    }

    /// Log a remote failure and move on; propagate local failures.
    async fn swallow_remote(&self, context: &str, error: Error) -> Result<()> {
        match error {
            Error::Database(_) | Error::NotFound(_) => Err(error),
            error => {
                warn!(
                    subsystem = "sync",
                    component = "entities",
                    error = %error,
                    "{}",
                    context
                );
                self.gateway
                    .log_warning(&format!("{}: {}", context, error))
                    .await;
                Ok(())
            }
        }
    }

    async fn write_back(
        &self,
        kind: ObjectKind,
        keys: &[i64],
        outcome: &BatchOutcome,
    ) -> Result<()> {
        let Some(results) = outcome.results() else {
            return Ok(());
        };
        let accepted: Vec<(i64, String)> = keys
            .iter()
            .zip(results)
            .filter(|(_, result)| result.success)
            .filter_map(|(key, result)| result.id.clone().map(|id| (*key, id)))
            .collect();
        if !accepted.is_empty() {
            self.mirror.set_remote_ids(kind, &accepted).await?;
        }
        Ok(())
    }
}

fn first_accepted_id(outcome: &BatchOutcome) -> Option<String> {
    outcome
        .results()?
        .first()
        .filter(|result| result.success)
        .and_then(|result| result.id.clone())
}
