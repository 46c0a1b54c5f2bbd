//! Domain models shared across the coursewire crates.
//!
//! Local rows use sequential integer ids; records that have been mirrored
//! into the CRM additionally carry an opaque `remote_id` string assigned by
//! the remote system. A missing `remote_id` means the row has not been
//! accepted remotely yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// =============================================================================
// ENTITY KINDS
// =============================================================================

/// Kind of local entity a keyword can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A media item (video, document, slide deck).
    Media,
    /// A presentation (course-level container).
    Presentation,
    /// A conversion task; bindings stay local and are never mirrored.
    ConversionTask,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Presentation => "presentation",
            Self::ConversionTask => "conversion_task",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "media" => Ok(Self::Media),
            "presentation" => Ok(Self::Presentation),
            "conversion_task" => Ok(Self::ConversionTask),
            _ => Err(format!("Invalid entity kind: {}", s)),
        }
    }
}

/// Kind of remote CRM object, used to derive object names for the wire
/// and mirror tables for remote-id write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Keyword,
    KeywordBinding,
    User,
    Course,
    Section,
    Activity,
    Completion,
    Assignment,
    Cohort,
    ConnectionMarker,
}

impl ObjectKind {
    /// Fully qualified remote object name under the given namespace prefix.
    ///
    /// The remote schema is a managed package; object and custom field names
    /// are fixed by the vendor and carry its namespace.
    pub fn remote_name(&self, namespace: &str) -> String {
        let base = match self {
            Self::Keyword => "Keyword__c",
            Self::KeywordBinding => "Keyword_Binding__c",
            Self::User => "MM_User__c",
            Self::Course => "Course__c",
            Self::Section => "Section__c",
            Self::Activity => "Activity__c",
            Self::Completion => "Activity_Completion__c",
            Self::Assignment => "Assigned__c",
            Self::Cohort => "Entatio__c",
            Self::ConnectionMarker => "Connection_String__c",
        };
        format!("{}{}", namespace, base)
    }
}

// =============================================================================
// KEYWORDS
// =============================================================================

/// A keyword row. Keywords are global; bindings attach them to entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub name: String,
    /// Remote CRM record id, if the keyword has been mirrored.
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A keyword-to-entity binding row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordBinding {
    pub id: i64,
    pub keyword_id: i64,
    pub entity_id: i64,
    pub entity_kind: EntityKind,
    /// Remote CRM record id, if the binding has been mirrored.
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request for creating a keyword binding.
///
/// `remote_id` is filled in before the local insert when the remote accepted
/// the binding, and left empty otherwise.
#[derive(Debug, Clone)]
pub struct CreateBindingRequest {
    pub keyword_id: i64,
    pub entity_id: i64,
    pub entity_kind: EntityKind,
    pub remote_id: Option<String>,
}

/// A single keyword edit submitted by a caller.
///
/// `add` wins when both flags are set; a change with neither flag is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordChange {
    pub name: String,
    #[serde(default)]
    pub add: bool,
    #[serde(default)]
    pub remove: bool,
}

/// Result of listing keywords for an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordListing {
    /// Every keyword, sorted by name.
    pub all: Vec<Keyword>,
    /// The subset currently bound to the requested entity.
    pub bound: Vec<Keyword>,
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// A record destined for the CRM, tagged with its remote object name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WireRecord {
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            fields: Map::new(),
        }
    }

    /// Set a field, consuming and returning the record for chaining.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Per-record outcome reported by the CRM for a create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResult {
    /// Remote record id; present on success.
    pub id: Option<String>,
    pub success: bool,
    /// Error messages for this record; empty on success.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SaveResult {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            id: None,
            success: false,
            errors,
        }
    }
}

/// One page of a remote query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    pub records: Vec<RemoteRecord>,
    /// True when this is the final page.
    pub done: bool,
    /// Opaque cursor for fetching the next page when `done` is false.
    pub query_locator: Option<String>,
}

impl QueryPage {
    /// A final page carrying the given records.
    pub fn last(records: Vec<RemoteRecord>) -> Self {
        Self {
            records,
            done: true,
            query_locator: None,
        }
    }
}

/// A record returned by a remote query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(rename = "Id", default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RemoteRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Read a field as an integer, accepting both JSON numbers and
    /// numeric strings; the remote reports numeric custom fields
    /// inconsistently between the two.
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        match self.fields.get(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn field_bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

// =============================================================================
// CREDENTIALS AND CONNECTION MARKER
// =============================================================================

/// Stored CRM login credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmCredential {
    pub id: i64,
    pub username: String,
    pub password: String,
    /// Appended to the password at login time.
    pub security_token: String,
    /// CRM host name, optionally with an explicit scheme.
    pub host: String,
    pub updated_at: DateTime<Utc>,
}

/// Marker record identifying this installation inside the CRM.
///
/// Mirrored entities reference the marker so one CRM org can receive data
/// from several installations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMarker {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub remote_id: Option<String>,
}

// =============================================================================
// SYNC LOG
// =============================================================================

/// A persisted sync log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: Uuid,
    /// Severity kind, e.g. "warning".
    pub kind: String,
    /// Originating subsystem, e.g. "sf".
    pub target: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ENTITY MIRROR INPUTS
// =============================================================================

/// A user row prepared for mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPush {
    pub user_id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub remote_id: Option<String>,
}

impl UserPush {
    /// Display name mirrored into the remote `Name` field: first and last
    /// name when both are present, the email address otherwise.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            _ => self.email.clone(),
        }
    }
}

/// A course row prepared for mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursePush {
    pub course_id: i64,
    /// Id of the presentation backing this course; mirrored as the remote
    /// course key.
    pub presentation_id: i64,
    pub name: String,
    pub link: String,
    pub description: Option<String>,
    pub remote_id: Option<String>,
}

/// A section row prepared for mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionPush {
    pub section_id: i64,
    pub name: String,
    pub course_remote_id: String,
    pub remote_id: Option<String>,
}

/// An activity row prepared for mirroring. Activities are backed by media
/// rows; the media id is what gets mirrored as the remote key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPush {
    pub activity_id: i64,
    pub media_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub section_remote_id: String,
    pub course_remote_id: String,
    pub remote_id: Option<String>,
}

/// An activity rename prepared for mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRename {
    pub remote_id: String,
    pub name: String,
}

/// A completion row prepared for mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPush {
    pub completion_id: i64,
    pub activity_remote_id: String,
    pub user_remote_id: String,
    pub completed: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub inactive: bool,
    pub remote_id: Option<String>,
}

/// A completed-state change for an already mirrored completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionUpdate {
    pub remote_id: String,
    pub completed: bool,
    /// Completion timestamp; the current time is used when absent.
    pub completed_at: Option<DateTime<Utc>>,
    pub inactive: bool,
}

/// An inactive-flag change for an already mirrored completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionStatus {
    pub remote_id: String,
    pub inactive: bool,
}

/// An assignment row prepared for mirroring.
///
/// The cohort fields are carried so missing cohorts can be created remotely
/// before the assignment batch is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentPush {
    pub cohort_id: i64,
    pub cohort_name: String,
    pub cohort_remote_id: Option<String>,
    pub activity_remote_id: String,
    pub user_remote_id: String,
    pub assigned: bool,
    pub assigned_date: Option<DateTime<Utc>>,
}

/// Selection of remote assignment rows to mark unassigned: every listed
/// activity for one user within one cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnassignSelection {
    pub activity_remote_ids: Vec<String>,
    pub user_remote_id: String,
    pub cohort_remote_id: String,
}

/// Filter over remote assignment rows. Present lists are ANDed together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignedFilter {
    pub activity_remote_ids: Vec<String>,
    pub user_remote_ids: Vec<String>,
    pub cohort_remote_ids: Vec<String>,
}

impl AssignedFilter {
    pub fn is_empty(&self) -> bool {
        self.activity_remote_ids.is_empty()
            && self.user_remote_ids.is_empty()
            && self.cohort_remote_ids.is_empty()
    }
}

// =============================================================================
// REMOTE CATALOG ENTRIES
// =============================================================================

/// A remote record paired with the local id it mirrors, as returned by the
/// catalog list queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub remote_id: String,
    /// Local id mirrored into the remote record, when the record carries one.
    pub local_id: Option<i64>,
    pub name: Option<String>,
}

/// A remote keyword binding record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteBindingEntry {
    pub remote_id: String,
    pub local_id: Option<i64>,
    pub activity_remote_id: Option<String>,
    pub course_remote_id: Option<String>,
    pub inactive: bool,
}

/// A remote completion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEntry {
    pub remote_id: String,
    pub local_id: Option<i64>,
    pub user_remote_id: Option<String>,
    pub activity_remote_id: Option<String>,
    pub inactive: bool,
}
