//! Entity push ops against in-memory stores and a scripted transport.

mod helpers;

use chrono::Utc;
use serde_json::json;

use coursewire_core::{
    AssignmentPush, CompletionPush, CoursePush, CrmCredential, Error, ObjectKind, QueryPage,
    SectionPush, SyncConfig, UnassignSelection, UserPush,
};
use coursewire_crm::mock::MockCrmCall;
use coursewire_sync::BatchOutcome;

use helpers::{entity_fixture, entity_fixture_with, MemMarkerStore};

fn mirrored_marker() -> MemMarkerStore {
    MemMarkerStore::with_marker("LMS", "https://lms.example", Some("cs-1"))
}

fn unmirrored_marker() -> MemMarkerStore {
    MemMarkerStore::with_marker("LMS", "https://lms.example", None)
}

fn user(id: i64, email: &str) -> UserPush {
    UserPush {
        user_id: id,
        email: email.to_string(),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        phone: None,
        remote_id: None,
    }
}

fn course(id: i64, presentation_id: i64) -> CoursePush {
    CoursePush {
        course_id: id,
        presentation_id,
        name: "Rust Basics".to_string(),
        link: "https://lms.example/course/9".to_string(),
        description: None,
        remote_id: None,
    }
}

fn assignment(
    cohort_id: i64,
    cohort_remote: Option<&str>,
    activity: &str,
    user: &str,
) -> AssignmentPush {
    AssignmentPush {
        cohort_id,
        cohort_name: format!("Cohort {}", cohort_id),
        cohort_remote_id: cohort_remote.map(str::to_string),
        activity_remote_id: activity.to_string(),
        user_remote_id: user.to_string(),
        assigned: true,
        assigned_date: None,
    }
}

#[tokio::test]
async fn test_push_users_writes_back_remote_ids() {
    let fx = entity_fixture(mirrored_marker());

    let users = vec![user(1, "ada@example.com"), user(2, "grace@example.com")];
    let outcome = fx.service.push_users(&users).await.expect("push");

    assert!(outcome.was_sent());
    assert_eq!(
        fx.mirror.for_kind(ObjectKind::User),
        vec![
            (1, "mock-id-1".to_string()),
            (2, "mock-id-2".to_string())
        ]
    );

    let batches = fx.mock.create_calls();
    assert_eq!(batches.len(), 1);
    let record = &batches[0][0];
    assert_eq!(record.object_type, "KMTMMP__MM_User__c");
    assert_eq!(record.get("Name"), Some(&"Ada Lovelace".into()));
    assert_eq!(
        record.get("KMTMMP__Username__c"),
        Some(&"ada@example.com".into())
    );
    assert_eq!(record.get("KMTMMP__Connection_String__c"), Some(&"cs-1".into()));
}

#[tokio::test]
async fn test_push_adopts_an_existing_remote_marker() {
    let fx = entity_fixture(unmirrored_marker());
    fx.mock.queue_page(QueryPage::last(vec![
        serde_json::from_value(json!({ "Id": "cs-found" })).expect("record"),
    ]));

    fx.service
        .push_users(&[user(1, "ada@example.com")])
        .await
        .expect("push");

    assert_eq!(fx.markers.current_remote_id().as_deref(), Some("cs-found"));
    let queries = fx.mock.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("FROM KMTMMP__Connection_String__c"));
    assert!(queries[0].contains("KMTMMP__Url__c = 'https://lms.example'"));

    // No marker insert happened; the only create is the user batch.
    let batches = fx.mock.create_calls();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0][0].get("KMTMMP__Connection_String__c"),
        Some(&"cs-found".into())
    );
}

#[tokio::test]
async fn test_push_registers_the_marker_when_absent_remotely() {
    let fx = entity_fixture(unmirrored_marker());

    fx.service
        .push_users(&[user(1, "ada@example.com")])
        .await
        .expect("push");

    let batches = fx.mock.create_calls();
    assert_eq!(batches.len(), 2);
    let marker_record = &batches[0][0];
    assert_eq!(marker_record.object_type, "KMTMMP__Connection_String__c");
    assert_eq!(marker_record.get("Name"), Some(&"LMS".into()));
    assert_eq!(
        marker_record.get("KMTMMP__Url__c"),
        Some(&"https://lms.example".into())
    );

    assert_eq!(fx.markers.current_remote_id().as_deref(), Some("mock-id-1"));
    assert_eq!(
        batches[1][0].get("KMTMMP__Connection_String__c"),
        Some(&"mock-id-1".into())
    );
    assert_eq!(fx.mirror.for_kind(ObjectKind::User), vec![(1, "mock-id-2".to_string())]);
}

#[tokio::test]
async fn test_push_reports_not_sent_when_the_marker_cannot_be_registered() {
    let fx = entity_fixture(unmirrored_marker());
    fx.mock.set_connect_failure(true);

    let outcome = fx
        .service
        .push_users(&[user(1, "ada@example.com")])
        .await
        .expect("push should not error");

    assert_eq!(outcome, BatchOutcome::NotSent);
    assert!(fx.mirror.written().is_empty());
    assert!(fx
        .log
        .messages()
        .iter()
        .any(|m| m.contains("Connection marker unavailable")));
}

#[tokio::test]
async fn test_push_disabled_reports_not_sent_without_connecting() {
    let fx = entity_fixture_with(mirrored_marker(), SyncConfig::disabled());

    let outcome = fx
        .service
        .push_users(&[user(1, "ada@example.com")])
        .await
        .expect("push should not error");

    assert_eq!(outcome, BatchOutcome::NotSent);
    assert_eq!(fx.mock.connect_call_count(), 0);
}

#[tokio::test]
async fn test_push_no_users_skips_the_marker_bootstrap() {
    let fx = entity_fixture(unmirrored_marker());

    let outcome = fx.service.push_users(&[]).await.expect("push");

    assert_eq!(outcome, BatchOutcome::Sent(Vec::new()));
    assert_eq!(fx.mock.connect_call_count(), 0);
    assert!(fx.markers.current_remote_id().is_none());
}

#[tokio::test]
async fn test_push_course_returns_the_remote_id_and_mirrors_it() {
    let fx = entity_fixture(mirrored_marker());

    let remote_id = fx.service.push_course(&course(4, 9)).await.expect("push");

    assert_eq!(remote_id.as_deref(), Some("mock-id-1"));
    assert_eq!(
        fx.mirror.for_kind(ObjectKind::Course),
        vec![(4, "mock-id-1".to_string())]
    );

    let record = &fx.mock.create_calls()[0][0];
    assert_eq!(record.object_type, "KMTMMP__Course__c");
    assert_eq!(record.get("KMTMMP__Moodle_Course_Id__c"), Some(&9.into()));
    assert_eq!(record.get("KMTMMP__Course_Name__c"), Some(&"Rust Basics".into()));
}

#[tokio::test]
async fn test_update_course_requires_a_mirrored_course() {
    let fx = entity_fixture(mirrored_marker());

    let err = fx
        .service
        .update_course(&course(4, 9))
        .await
        .expect_err("unmirrored course must be rejected");

    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_push_section_mirrors_the_section_id() {
    let fx = entity_fixture(mirrored_marker());

    let section = SectionPush {
        section_id: 21,
        name: "Week 1".to_string(),
        course_remote_id: "course-sf".to_string(),
        remote_id: None,
    };
    let remote_id = fx.service.push_section(&section).await.expect("push");

    assert_eq!(remote_id.as_deref(), Some("mock-id-1"));
    assert_eq!(
        fx.mirror.for_kind(ObjectKind::Section),
        vec![(21, "mock-id-1".to_string())]
    );
    let record = &fx.mock.create_calls()[0][0];
    assert_eq!(record.get("KMTMMP__Course__c"), Some(&"course-sf".into()));
}

#[tokio::test]
async fn test_push_completions_mirrors_by_completion_id() {
    let fx = entity_fixture(mirrored_marker());

    let completions = vec![CompletionPush {
        completion_id: 77,
        activity_remote_id: "act-1".to_string(),
        user_remote_id: "usr-1".to_string(),
        completed: true,
        completed_date: Some(Utc::now()),
        inactive: false,
        remote_id: None,
    }];
    let outcome = fx
        .service
        .push_completions(&completions)
        .await
        .expect("push");

    assert!(outcome.was_sent());
    assert_eq!(
        fx.mirror.for_kind(ObjectKind::Completion),
        vec![(77, "mock-id-1".to_string())]
    );
    let record = &fx.mock.create_calls()[0][0];
    assert_eq!(record.get("KMTMMP__Activity__c"), Some(&"act-1".into()));
    assert_eq!(record.get("KMTMMP__Completed__c"), Some(&true.into()));
    assert!(record.get("KMTMMP__CompletedDate__c").is_some());
}

#[tokio::test]
async fn test_update_users_skips_unmirrored_rows() {
    let fx = entity_fixture(mirrored_marker());

    let mirrored = UserPush {
        remote_id: Some("usr-sf-1".to_string()),
        ..user(1, "ada@example.com")
    };
    let outcome = fx
        .service
        .update_users(&[mirrored, user(2, "grace@example.com")])
        .await;

    let results = outcome.results().expect("sent");
    assert_eq!(results.len(), 1);

    let updates = fx.mock.update_calls();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 1);
    assert_eq!(updates[0][0].get("Id"), Some(&"usr-sf-1".into()));
}

#[tokio::test]
async fn test_deactivate_flags_records_of_the_given_kind() {
    let fx = entity_fixture(mirrored_marker());

    let outcome = fx
        .service
        .deactivate(ObjectKind::Completion, &["cmp-1".to_string()])
        .await;

    assert!(outcome.was_sent());
    let record = &fx.mock.update_calls()[0][0];
    assert_eq!(record.object_type, "KMTMMP__Activity_Completion__c");
    assert_eq!(record.get("Id"), Some(&"cmp-1".into()));
    assert_eq!(record.get("KMTMMP__Inactive__c"), Some(&true.into()));
}

#[tokio::test]
async fn test_push_assignments_creates_missing_cohorts() {
    let fx = entity_fixture(mirrored_marker());

    let assignments = vec![
        assignment(5, None, "act-1", "usr-1"),
        assignment(5, None, "act-2", "usr-1"),
        assignment(6, Some("coh-6"), "act-1", "usr-2"),
    ];
    let outcome = fx
        .service
        .push_assignments(&assignments, false)
        .await
        .expect("push");
    assert!(outcome.was_sent());

    let batches = fx.mock.create_calls();
    assert_eq!(batches.len(), 2);

    // Cohort 5 is created once despite appearing twice.
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].object_type, "KMTMMP__Entatio__c");
    assert_eq!(batches[0][0].get("Name"), Some(&"Cohort 5".into()));
    assert_eq!(
        fx.mirror.for_kind(ObjectKind::Cohort),
        vec![(5, "mock-id-1".to_string())]
    );

    // The fresh remote id is filled into both of cohort 5's assignments.
    assert_eq!(batches[1].len(), 3);
    assert_eq!(batches[1][0].get("KMTMMP__Entatio__c"), Some(&"mock-id-1".into()));
    assert_eq!(batches[1][1].get("KMTMMP__Entatio__c"), Some(&"mock-id-1".into()));
    assert_eq!(batches[1][2].get("KMTMMP__Entatio__c"), Some(&"coh-6".into()));

    // Assignments themselves get no write-back.
    assert!(fx.mirror.for_kind(ObjectKind::Assignment).is_empty());
}

#[tokio::test]
async fn test_push_assignments_sweeps_duplicates_before_inserting() {
    let fx = entity_fixture(mirrored_marker());
    fx.mock.queue_page(QueryPage::last(vec![
        serde_json::from_value(json!({ "Id": "dup-1" })).expect("record"),
        serde_json::from_value(json!({ "Id": "dup-2" })).expect("record"),
    ]));

    let assignments = vec![assignment(5, Some("coh-1"), "act-1", "usr-1")];
    let outcome = fx
        .service
        .push_assignments(&assignments, true)
        .await
        .expect("push");
    assert!(outcome.was_sent());

    let queries = fx.mock.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("KMTMMP__Activity__c IN ('act-1')"));
    assert!(queries[0].contains("KMTMMP__User__c IN ('usr-1')"));
    assert!(queries[0].contains("KMTMMP__Entatio__c IN ('coh-1')"));
    assert!(queries[0].contains("KMTMMP__Connection_String__c = 'cs-1'"));
    assert!(queries[0].contains("KMTMMP__Inactive__c = FALSE"));

    let updates = fx.mock.update_calls();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 2);
    assert_eq!(updates[0][0].get("Id"), Some(&"dup-1".into()));
    assert_eq!(updates[0][0].get("KMTMMP__Inactive__c"), Some(&true.into()));

    // Lookup, then deactivation, then the insert.
    let calls = fx.mock.get_calls();
    let position = |pred: fn(&MockCrmCall) -> bool| calls.iter().position(pred).expect("call");
    let query_at = position(|c| matches!(c, MockCrmCall::Query { .. }));
    let update_at = position(|c| matches!(c, MockCrmCall::Update { .. }));
    let create_at = position(|c| matches!(c, MockCrmCall::Create { .. }));
    assert!(query_at < update_at);
    assert!(update_at < create_at);
}

#[tokio::test]
async fn test_push_assignments_aborts_the_insert_when_the_sweep_fails() {
    let fx = entity_fixture(mirrored_marker());
    fx.mock.queue_page(QueryPage::last(vec![
        serde_json::from_value(json!({ "Id": "dup-1" })).expect("record"),
    ]));
    fx.mock.queue_transport_error("socket reset");

    let assignments = vec![assignment(5, Some("coh-1"), "act-1", "usr-1")];
    let outcome = fx
        .service
        .push_assignments(&assignments, true)
        .await
        .expect("push should not error");

    assert_eq!(outcome, BatchOutcome::NotSent);
    assert!(fx.mock.create_calls().is_empty());
    assert!(fx
        .log
        .messages()
        .iter()
        .any(|m| m.contains("Assignment sweep failed")));
}

#[tokio::test]
async fn test_push_no_assignments_is_a_noop() {
    let fx = entity_fixture(unmirrored_marker());

    let outcome = fx
        .service
        .push_assignments(&[], true)
        .await
        .expect("push");

    assert_eq!(outcome, BatchOutcome::Sent(Vec::new()));
    assert_eq!(fx.mock.connect_call_count(), 0);
}

#[tokio::test]
async fn test_unassign_targets_only_the_selected_assignments() {
    let fx = entity_fixture(mirrored_marker());
    fx.mock.queue_page(QueryPage::last(vec![
        serde_json::from_value(json!({ "Id": "asg-1" })).expect("record"),
    ]));

    let selections = vec![
        UnassignSelection {
            activity_remote_ids: vec!["act-1".to_string(), "act-2".to_string()],
            user_remote_id: "usr-1".to_string(),
            cohort_remote_id: "coh-1".to_string(),
        },
        UnassignSelection {
            activity_remote_ids: Vec::new(),
            user_remote_id: "usr-2".to_string(),
            cohort_remote_id: "coh-1".to_string(),
        },
    ];
    let outcome = fx.service.unassign(&selections).await.expect("unassign");
    assert!(outcome.was_sent());

    let queries = fx.mock.queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains(
        "(KMTMMP__Activity__c IN ('act-1', 'act-2') \
         AND KMTMMP__User__c = 'usr-1' AND KMTMMP__Entatio__c = 'coh-1')"
    ));
    assert!(queries[0].contains("KMTMMP__Connection_String__c = 'cs-1'"));
    // The empty selection contributes no clause.
    assert!(!queries[0].contains("usr-2"));

    let updates = fx.mock.update_calls();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0][0].get("Id"), Some(&"asg-1".into()));
    assert_eq!(updates[0][0].get("KMTMMP__Assigned__c"), Some(&false.into()));
}

#[tokio::test]
async fn test_unassign_with_no_usable_selections_is_a_noop() {
    let fx = entity_fixture(mirrored_marker());

    let selections = vec![UnassignSelection {
        activity_remote_ids: Vec::new(),
        user_remote_id: "usr-1".to_string(),
        cohort_remote_id: "coh-1".to_string(),
    }];
    let outcome = fx.service.unassign(&selections).await.expect("unassign");

    assert_eq!(outcome, BatchOutcome::Sent(Vec::new()));
    assert_eq!(fx.mock.connect_call_count(), 0);
}

#[tokio::test]
async fn test_completion_listing_drains_every_page() {
    let fx = entity_fixture(mirrored_marker());
    fx.mock.queue_page(QueryPage {
        records: vec![serde_json::from_value(json!({
            "Id": "cmp-1",
            "KMTMMP__MM_Id__c": 11,
            "KMTMMP__Media_Manager_User__c": "usr-1",
            "KMTMMP__Inactive__c": "false"
        }))
        .expect("record")],
        done: false,
        query_locator: Some("cur-1".to_string()),
    });
    fx.mock.queue_page(QueryPage::last(vec![serde_json::from_value(json!({
        "Id": "cmp-2",
        "KMTMMP__MM_Id__c": "12",
        "KMTMMP__Media_Manager_User__c": "usr-2",
        "KMTMMP__Inactive__c": "true"
    }))
    .expect("record")]));

    let entries = fx.catalog.list_completions("act-1").await.expect("listing");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].remote_id, "cmp-1");
    assert_eq!(entries[0].local_id, Some(11));
    assert_eq!(entries[0].user_remote_id.as_deref(), Some("usr-1"));
    assert_eq!(entries[0].activity_remote_id.as_deref(), Some("act-1"));
    assert!(!entries[0].inactive);
    // Numeric strings and string booleans both parse.
    assert_eq!(entries[1].local_id, Some(12));
    assert!(entries[1].inactive);

    let followed_locator = fx.mock.get_calls().iter().any(|c| {
        matches!(c, MockCrmCall::QueryMore { locator } if locator == "cur-1")
    });
    assert!(followed_locator);
}

#[tokio::test]
async fn test_validate_credentials_reports_login_outcome() {
    let fx = entity_fixture_with(mirrored_marker(), SyncConfig::disabled());
    let credentials = CrmCredential {
        id: 1,
        username: "ops@example.com".to_string(),
        password: "hunter2".to_string(),
        security_token: "TOKEN".to_string(),
        host: "login.example.com".to_string(),
        updated_at: Utc::now(),
    };

    // Explicit credentials bypass the disabled flag.
    assert!(fx.catalog.validate_credentials(&credentials).await);

    fx.mock.set_connect_failure(true);
    assert!(!fx.catalog.validate_credentials(&credentials).await);
}
