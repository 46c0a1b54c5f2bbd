//! Pure mapping functions from domain records to CRM wire shapes.
//!
//! One function per remote object and operation. The remote schema is a
//! managed package: custom objects and fields carry its namespace prefix,
//! while standard fields (`Id`, `Name`) do not. Insert shapes and update
//! shapes differ per object, so they get separate functions.

use chrono::Utc;

use coursewire_core::{
    ActivityPush, ActivityRename, AssignmentPush, CompletionPush, CompletionStatus,
    CompletionUpdate, CoursePush, Keyword, ObjectKind, SectionPush, UserPush, WireRecord,
};
use coursewire_crm::wire::prefixed;

/// Keyword insert: name plus the local id for reverse lookup.
pub fn keyword_record(ns: &str, keyword: &Keyword) -> WireRecord {
    WireRecord::new(ObjectKind::Keyword.remote_name(ns))
        .field("Name", keyword.name.clone())
        .field(prefixed(ns, "MM_Id__c"), keyword.id)
}

/// A keyword binding prepared for the remote: the mirrored keyword plus at
/// most one mirrored parent. All three reference fields are always present
/// on the wire; the ones that do not apply are null.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BindingSubmission {
    pub keyword_remote_id: String,
    pub activity_remote_id: Option<String>,
    pub course_remote_id: Option<String>,
}

pub fn keyword_binding_record(ns: &str, submission: &BindingSubmission) -> WireRecord {
    WireRecord::new(ObjectKind::KeywordBinding.remote_name(ns))
        .field(
            prefixed(ns, "Keyword__c"),
            submission.keyword_remote_id.clone(),
        )
        .field(
            prefixed(ns, "Interaction_Activity__c"),
            submission.activity_remote_id.clone(),
        )
        .field(
            prefixed(ns, "Presentation__c"),
            submission.course_remote_id.clone(),
        )
}

pub fn user_record(ns: &str, user: &UserPush, marker_remote_id: &str) -> WireRecord {
    WireRecord::new(ObjectKind::User.remote_name(ns))
        .field("Name", user.display_name())
        .field(prefixed(ns, "Firstname__c"), user.first_name.clone())
        .field(prefixed(ns, "Lastname__c"), user.last_name.clone())
        .field(prefixed(ns, "Phone1__c"), user.phone.clone())
        .field(prefixed(ns, "Username__c"), user.email.clone())
        .field(prefixed(ns, "MM_Id__c"), user.user_id)
        .field(
            prefixed(ns, "Connection_String__c"),
            marker_remote_id.to_string(),
        )
}

/// User update: same shape minus the local id and installation marker,
/// which never change.
pub fn user_update_record(ns: &str, user: &UserPush) -> WireRecord {
    WireRecord::new(ObjectKind::User.remote_name(ns))
        .field("Id", user.remote_id.clone())
        .field("Name", user.display_name())
        .field(prefixed(ns, "Firstname__c"), user.first_name.clone())
        .field(prefixed(ns, "Lastname__c"), user.last_name.clone())
        .field(prefixed(ns, "Phone1__c"), user.phone.clone())
        .field(prefixed(ns, "Username__c"), user.email.clone())
}

pub fn course_record(ns: &str, course: &CoursePush, marker_remote_id: &str) -> WireRecord {
    WireRecord::new(ObjectKind::Course.remote_name(ns))
        .field("Name", course.name.clone())
        .field(
            prefixed(ns, "Connection_String__c"),
            marker_remote_id.to_string(),
        )
        .field(prefixed(ns, "Course_Name__c"), course.name.clone())
        .field(prefixed(ns, "Course_Link__c"), course.link.clone())
        .field(prefixed(ns, "Moodle_Course_Id__c"), course.presentation_id)
        .field(prefixed(ns, "Description__c"), course.description.clone())
}

pub fn course_update_record(ns: &str, course: &CoursePush, marker_remote_id: &str) -> WireRecord {
    course_record(ns, course, marker_remote_id).field("Id", course.remote_id.clone())
}

pub fn section_record(ns: &str, section: &SectionPush) -> WireRecord {
    WireRecord::new(ObjectKind::Section.remote_name(ns))
        .field("Name", section.name.clone())
        .field(prefixed(ns, "Name__c"), section.name.clone())
        .field(prefixed(ns, "MM_Id__c"), section.section_id)
        .field(prefixed(ns, "Course__c"), section.course_remote_id.clone())
}

/// Section update: only the names change; the course reference and local id
/// are fixed at insert time.
pub fn section_update_record(ns: &str, section: &SectionPush) -> WireRecord {
    WireRecord::new(ObjectKind::Section.remote_name(ns))
        .field("Id", section.remote_id.clone())
        .field("Name", section.name.clone())
        .field(prefixed(ns, "Name__c"), section.name.clone())
}

pub fn activity_record(ns: &str, activity: &ActivityPush) -> WireRecord {
    WireRecord::new(ObjectKind::Activity.remote_name(ns))
        .field("Name", activity.name.clone())
        .field(prefixed(ns, "Name__c"), activity.name.clone())
        .field(prefixed(ns, "Description__c"), activity.description.clone())
        .field(prefixed(ns, "MM_Id__c"), activity.media_id)
        .field(prefixed(ns, "Section__c"), activity.section_remote_id.clone())
        .field(prefixed(ns, "General__c"), activity.course_remote_id.clone())
        .field(prefixed(ns, "Visible__c"), true)
}

pub fn activity_name_record(ns: &str, rename: &ActivityRename) -> WireRecord {
    WireRecord::new(ObjectKind::Activity.remote_name(ns))
        .field("Id", rename.remote_id.clone())
        .field("Name", rename.name.clone())
        .field(prefixed(ns, "Name__c"), rename.name.clone())
}

pub fn completion_record(ns: &str, completion: &CompletionPush) -> WireRecord {
    let mut record = WireRecord::new(ObjectKind::Completion.remote_name(ns))
        .field(
            prefixed(ns, "Activity__c"),
            completion.activity_remote_id.clone(),
        )
        .field(prefixed(ns, "Completed__c"), completion.completed)
        .field(
            prefixed(ns, "Media_Manager_User__c"),
            completion.user_remote_id.clone(),
        )
        .field(prefixed(ns, "Inactive__c"), completion.inactive)
        .field(prefixed(ns, "MM_Id__c"), completion.completion_id);
    if let Some(date) = completion.completed_date {
        record = record.field(prefixed(ns, "CompletedDate__c"), date.to_rfc3339());
    }
    record
}

/// Completed-state update. The completion date is stamped only when the
/// record flips to completed, and the inactive flag only when set; absent
/// fields keep their remote values.
pub fn completion_update_record(ns: &str, update: &CompletionUpdate) -> WireRecord {
    let mut record = WireRecord::new(ObjectKind::Completion.remote_name(ns))
        .field("Id", update.remote_id.clone())
        .field(prefixed(ns, "Completed__c"), update.completed);
    if update.completed {
        let date = update.completed_at.unwrap_or_else(Utc::now);
        record = record.field(prefixed(ns, "CompletedDate__c"), date.to_rfc3339());
    }
    if update.inactive {
        record = record.field(prefixed(ns, "Inactive__c"), true);
    }
    record
}

pub fn completion_status_record(ns: &str, status: &CompletionStatus) -> WireRecord {
    WireRecord::new(ObjectKind::Completion.remote_name(ns))
        .field("Id", status.remote_id.clone())
        .field(prefixed(ns, "Inactive__c"), status.inactive)
}

pub fn assignment_record(
    ns: &str,
    assignment: &AssignmentPush,
    marker_remote_id: &str,
) -> WireRecord {
    let mut record = WireRecord::new(ObjectKind::Assignment.remote_name(ns))
        .field(
            prefixed(ns, "Entatio__c"),
            assignment.cohort_remote_id.clone(),
        )
        .field(
            prefixed(ns, "Activity__c"),
            assignment.activity_remote_id.clone(),
        )
        .field(prefixed(ns, "User__c"), assignment.user_remote_id.clone())
        .field(prefixed(ns, "Assigned__c"), assignment.assigned)
        .field(
            prefixed(ns, "Connection_String__c"),
            marker_remote_id.to_string(),
        );
    if let Some(date) = assignment.assigned_date {
        record = record.field(prefixed(ns, "AssignedDate__c"), date.to_rfc3339());
    }
    record
}

/// Cohort insert carries nothing but the name.
pub fn cohort_record(ns: &str, name: &str) -> WireRecord {
    WireRecord::new(ObjectKind::Cohort.remote_name(ns)).field("Name", name.to_string())
}

pub fn cohort_rename_record(ns: &str, remote_id: &str, name: &str) -> WireRecord {
    WireRecord::new(ObjectKind::Cohort.remote_name(ns))
        .field("Id", remote_id.to_string())
        .field("Name", name.to_string())
}

pub fn connection_marker_record(ns: &str, name: &str, url: &str) -> WireRecord {
    WireRecord::new(ObjectKind::ConnectionMarker.remote_name(ns))
        .field("Name", name.to_string())
        .field(prefixed(ns, "Name__c"), name.to_string())
        .field(prefixed(ns, "Url__c"), url.to_string())
}

/// Mark any mirrored record inactive. Works for every object kind that
/// carries the shared inactive flag.
pub fn deactivation_record(ns: &str, kind: ObjectKind, remote_id: &str) -> WireRecord {
    WireRecord::new(kind.remote_name(ns))
        .field("Id", remote_id.to_string())
        .field(prefixed(ns, "Inactive__c"), true)
}

pub fn unassign_record(ns: &str, remote_id: &str) -> WireRecord {
    WireRecord::new(ObjectKind::Assignment.remote_name(ns))
        .field("Id", remote_id.to_string())
        .field(prefixed(ns, "Assigned__c"), false)
}
