use crate::error::Error;
use crate::orchestrator::FlowAction;
use crate::orchestrator::test_helpers::create_test_orchestrator;
use crate::types::{Event, MediaRef, ScheduleStatus, UploadJob, UploadKind, UserId};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::next_matching;

#[tokio::test]
async fn test_shutdown_emits_event_and_rejects_new_work() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let mut events = orch.subscribe();

    orch.shutdown().await.unwrap();

    let event = next_matching(&mut events, |e| matches!(e, Event::Shutdown)).await;
    assert_eq!(event, Event::Shutdown);

    let result = orch
        .handle_action(UserId(1), FlowAction::Begin {
            kind: UploadKind::Post,
        })
        .await;
    assert!(matches!(result, Err(Error::ShuttingDown)));
}

#[tokio::test]
async fn test_shutdown_drains_tracked_tasks() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;

    // An armed inactivity timeout is a tracked task
    orch.handle_action(UserId(1), FlowAction::Begin {
        kind: UploadKind::Post,
    })
    .await
    .unwrap();
    assert!(!orch.registry.is_empty());

    orch.shutdown().await.unwrap();
    assert!(orch.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_daemon_exit() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;

    orch.start_scheduler();
    tokio::time::timeout(Duration::from_secs(30), orch.shutdown())
        .await
        .expect("shutdown must not hang on the daemon")
        .unwrap();

    // A due entry appearing after shutdown is never claimed
    let user = UserId(4);
    let job = UploadJob::new(user, UploadKind::BulkItem, vec![MediaRef::new("file")]);
    let id = orch
        .db
        .insert_schedule(user, &job, Utc::now() - ChronoDuration::minutes(1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(130)).await;
    let row = orch.db.get_schedule(id).await.unwrap().unwrap();
    assert_eq!(ScheduleStatus::from_i32(row.status), ScheduleStatus::Pending);
}

#[tokio::test]
async fn test_concurrency_limit_reload() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;

    assert!(matches!(
        orch.set_max_concurrent_uploads(0),
        Err(Error::Config { .. })
    ));

    orch.set_max_concurrent_uploads(5).unwrap();
    assert_eq!(orch.gate.available_permits(), 5);
}

#[tokio::test]
async fn test_broadcast_reaches_all_users() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let users = [UserId(1), UserId(2), UserId(3)];

    let delivered = orch.broadcast(&users, "maintenance tonight").await;
    assert_eq!(delivered, 3);
    for user in users {
        let messages = harness.transport.messages_for(user);
        assert_eq!(messages, vec!["maintenance tonight".to_string()]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_retries_rate_limited_send() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let user = UserId(5);

    // First send attempt is answered with a rate-limit fault
    harness.transport.rate_limited_sends.store(1, Ordering::SeqCst);

    let delivered = orch.broadcast(&[user], "maintenance tonight").await;
    assert_eq!(delivered, 1);
    assert_eq!(harness.transport.send_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(
        harness.transport.messages_for(user),
        vec!["maintenance tonight".to_string()]
    );
}
