//! End-to-end projection: mock event source, real handlers, Postgres.
//! Set DATABASE_TEST_URL or these tests are skipped.

use std::sync::Arc;

use calendrun_common::events::{event_types, flows};
use calendrun_projector::handlers::{ClubOp, ClubProjection, RunOp, RunProjection, UserOp, UserProjection};
use calendrun_projector::testing::{bucket, page, raw_event, MockEventSource};
use calendrun_projector::{DispatchRegistry, HandlerError, ProjectionEngine, ProjectionHandler};
use calendrun_readmodel::ReadModel;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_read_model() -> Option<ReadModel> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let read_model = ReadModel::new(pool);
    read_model.migrate().await.ok()?;
    Some(read_model)
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

fn run_logged(id: Uuid, instance_id: Uuid, distance_km: f64) -> Value {
    json!({
        "id": id,
        "instanceId": instance_id,
        "userId": "kc-user-1",
        "runnerName": "Ada",
        "runDate": "2025-03-07T06:30:00Z",
        "distanceKm": distance_km,
        "timeMinutes": 31,
        "notes": 42
    })
}

#[tokio::test]
async fn redelivered_page_leaves_row_and_audit_untouched() {
    let Some(rm) = test_read_model().await else {
        return;
    };
    let b = bucket("20250307060000");
    let run_id = Uuid::new_v4();
    let event_id = unique("e1");
    let delivery = page(
        vec![raw_event(
            &event_id,
            flows::RUN,
            event_types::RUN_LOGGED,
            run_logged(run_id, Uuid::new_v4(), 5.0),
        )],
        None,
    );
    let source = Arc::new(MockEventSource::new().on_page(
        flows::RUN,
        event_types::RUN_LOGGED,
        &b,
        None,
        delivery,
    ));
    let registry = Arc::new(DispatchRegistry::calendrun(rm.clone()));

    let mut first = ProjectionEngine::new(source.clone(), registry.clone(), 500);
    assert_eq!(first.process_bucket(&b).await.processed, 1);

    // A cold engine has no dedup memory; only the guarded write protects the row.
    let mut second = ProjectionEngine::new(source.clone(), registry, 500);
    second.process_bucket(&b).await;

    let row = rm.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(row.distance_km, 5.0);
    assert_eq!(row.last_applied_event_id, event_id);
    assert_eq!(row.notes.as_deref(), Some("42"));
    assert_eq!(rm.performance_logs_for_run(run_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn run_update_and_delete_are_audited() {
    let Some(rm) = test_read_model().await else {
        return;
    };
    let run_id = Uuid::new_v4();
    let instance_id = Uuid::new_v4();

    RunProjection::new(rm.clone(), RunOp::Logged)
        .apply(&run_logged(run_id, instance_id, 5.0), &unique("logged"))
        .await
        .unwrap();
    RunProjection::new(rm.clone(), RunOp::Updated)
        .apply(
            &json!({"id": run_id, "instanceId": instance_id, "userId": "kc-user-1", "distanceKm": 6.5}),
            &unique("updated"),
        )
        .await
        .unwrap();

    let row = rm.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(row.distance_km, 6.5);
    assert_eq!(row.runner_name.as_deref(), Some("Ada"));

    RunProjection::new(rm.clone(), RunOp::Deleted)
        .apply(
            &json!({"id": run_id, "instanceId": instance_id, "userId": "kc-user-1"}),
            &unique("deleted"),
        )
        .await
        .unwrap();

    assert!(rm.get_run(run_id).await.unwrap().is_none());
    let logs = rm.performance_logs_for_run(run_id).await.unwrap();
    let types: Vec<&str> = logs.iter().map(|l| l.event_type.as_str()).collect();
    assert_eq!(types.len(), 3);
    assert!(types.contains(&event_types::RUN_DELETED));
    let deleted = logs
        .iter()
        .find(|l| l.event_type == event_types::RUN_DELETED)
        .unwrap();
    assert_eq!(deleted.distance_km, Some(6.5));
}

#[tokio::test]
async fn invalid_payload_is_a_validation_error() {
    let Some(rm) = test_read_model().await else {
        return;
    };
    let result = RunProjection::new(rm, RunOp::Logged)
        .apply(&json!({"id": "not-a-uuid"}), &unique("bad"))
        .await;

    assert!(matches!(result, Err(HandlerError::Validation(_))));
}

#[tokio::test]
async fn member_joined_before_user_created_is_tolerated() {
    let Some(rm) = test_read_model().await else {
        return;
    };
    let club_id = Uuid::new_v4();
    let user_id = unique("kc-user");

    // The user projection doesn't exist yet: name stays NULL, no failure.
    ClubProjection::new(rm.clone(), ClubOp::MemberJoined)
        .apply(
            &json!({
                "id": Uuid::new_v4(),
                "clubId": club_id,
                "userId": user_id,
                "joinedAt": "2025-03-07T09:00:00Z"
            }),
            &unique("joined"),
        )
        .await
        .unwrap();

    let members = rm.club_members(club_id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert!(members[0].user_name.is_none());

    UserProjection::new(rm.clone(), UserOp::Created)
        .apply(&json!({"id": user_id, "name": "Ada"}), &unique("user"))
        .await
        .unwrap();
    UserProjection::new(rm.clone(), UserOp::Updated)
        .apply(&json!({"id": user_id, "email": "ada@example.com"}), &unique("user"))
        .await
        .unwrap();

    let user = rm.get_user(&user_id).await.unwrap().unwrap();
    assert_eq!(user.name.as_deref(), Some("Ada"));
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
}
