use crate::error::PublishError;
use crate::orchestrator::FlowAction;
use crate::orchestrator::test_helpers::{TestHarness, create_test_orchestrator, create_test_orchestrator_with};
use crate::types::{Event, FlowState, MediaRef, UploadKind, UserId, UserSettings, UserTier};
use std::sync::atomic::Ordering;

use super::{eventually, next_matching};

/// Drive a post through the whole interactive flow up to dispatch
async fn dispatch_post(harness: &TestHarness, user: UserId, caption: &str) {
    let orch = &harness.orchestrator;
    orch.handle_action(user, FlowAction::Begin {
        kind: UploadKind::Post,
    })
    .await
    .unwrap();
    orch.handle_action(user, FlowAction::AddMedia {
        media: MediaRef::new("photo"),
    })
    .await
    .unwrap();
    orch.handle_action(user, FlowAction::Caption {
        text: caption.to_string(),
    })
    .await
    .unwrap();
    orch.handle_action(user, FlowAction::PublishNow).await.unwrap();
}

#[tokio::test]
async fn test_interactive_upload_end_to_end() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let user = UserId(1);
    let mut events = orch.subscribe();

    dispatch_post(&harness, user, "hello world").await;

    let event = next_matching(&mut events, |e| {
        matches!(e, Event::UploadComplete { .. })
    })
    .await;
    match event {
        Event::UploadComplete { user_id, media } => {
            assert_eq!(user_id, user);
            assert!(media.url.starts_with("https://"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    let published = harness.publisher.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].caption.as_deref(), Some("hello world"));
    assert_eq!(published[0].paths.len(), 1);

    // Terminal outcome: flow reset, history recorded, temp files purged
    eventually(async || orch.db.get_flow(user).await.unwrap() == FlowState::Idle).await;
    let outcomes = orch.db.list_outcomes(user, 10).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    eventually(async || harness.transport.files_on_disk() == 0).await;
}

#[tokio::test]
async fn test_publish_failure_cleans_up_and_notifies() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let user = UserId(2);
    let mut events = orch.subscribe();

    harness.publisher.fail_next_with(PublishError::RejectedMedia {
        path: "photo.bin".into(),
        reason: "unsupported format".to_string(),
    });

    dispatch_post(&harness, user, "doomed").await;

    next_matching(&mut events, |e| matches!(e, Event::UploadFailed { .. })).await;

    eventually(async || orch.db.get_flow(user).await.unwrap() == FlowState::Idle).await;
    eventually(async || harness.transport.files_on_disk() == 0).await;
    assert!(orch.db.list_outcomes(user, 10).await.unwrap().is_empty());

    eventually(async || {
        harness
            .transport
            .messages_for(user)
            .iter()
            .any(|m| m.contains("rejected"))
    })
    .await;
}

#[tokio::test]
async fn test_transform_applied_before_publish() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let user = UserId(3);
    let mut events = orch.subscribe();

    harness.transform.active.store(true, Ordering::SeqCst);
    dispatch_post(&harness, user, "with transform").await;

    next_matching(&mut events, |e| matches!(e, Event::UploadComplete { .. })).await;

    let published = harness.publisher.published.lock().unwrap().clone();
    assert_eq!(published[0].paths[0].extension().unwrap(), "out");
    assert_eq!(harness.transform.transformed.lock().unwrap().len(), 1);

    // Both the original and the transformed copy are cleaned up
    eventually(async || harness.transport.files_on_disk() == 0).await;
}

#[tokio::test]
async fn test_hashtags_routed_to_first_comment() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let user = UserId(4);
    let mut events = orch.subscribe();

    orch.db
        .save_settings(user, &UserSettings {
            default_caption: String::new(),
            hashtags: "#rust #async".to_string(),
            hashtags_in_first_comment: true,
            tier: UserTier::Trial,
        })
        .await
        .unwrap();

    dispatch_post(&harness, user, "caption only").await;
    next_matching(&mut events, |e| matches!(e, Event::UploadComplete { .. })).await;

    let published = harness.publisher.published.lock().unwrap().clone();
    assert_eq!(published[0].caption.as_deref(), Some("caption only"));

    eventually(async || {
        harness
            .publisher
            .comments
            .lock()
            .unwrap()
            .iter()
            .any(|(_, text)| text == "#rust #async")
    })
    .await;
}

#[tokio::test]
async fn test_oversized_file_rejected() {
    let harness = create_test_orchestrator_with(|config| {
        config.max_file_size_mb = 0;
    })
    .await;
    let orch = &harness.orchestrator;
    let user = UserId(5);
    let mut events = orch.subscribe();

    dispatch_post(&harness, user, "too big").await;

    let event = next_matching(&mut events, |e| matches!(e, Event::UploadFailed { .. })).await;
    match event {
        Event::UploadFailed { error, .. } => assert!(error.contains("limit exceeded")),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(harness.publisher.published.lock().unwrap().is_empty());
    eventually(async || harness.transport.files_on_disk() == 0).await;
}

#[tokio::test]
async fn test_download_failure_fails_run() {
    let harness = create_test_orchestrator().await;
    let orch = &harness.orchestrator;
    let user = UserId(6);
    let mut events = orch.subscribe();

    // The flow's preview fetch is best-effort, so arm the failure only
    // after the flow reaches dispatch.
    orch.handle_action(user, FlowAction::Begin {
        kind: UploadKind::Post,
    })
    .await
    .unwrap();
    orch.handle_action(user, FlowAction::AddMedia {
        media: MediaRef::new("photo"),
    })
    .await
    .unwrap();
    orch.handle_action(user, FlowAction::SkipCaption).await.unwrap();
    harness.transport.fail_downloads.store(true, Ordering::SeqCst);
    orch.handle_action(user, FlowAction::PublishNow).await.unwrap();

    next_matching(&mut events, |e| matches!(e, Event::UploadFailed { .. })).await;
    assert!(harness.publisher.published.lock().unwrap().is_empty());
    eventually(async || orch.db.get_flow(user).await.unwrap() == FlowState::Idle).await;
}
