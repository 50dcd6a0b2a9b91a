use crate::db::*;
use crate::types::{MediaRef, ScheduleStatus, UploadJob, UploadKind, UserId};
use chrono::{Duration, Utc};
use tempfile::NamedTempFile;

fn sample_job(user: UserId) -> UploadJob {
    UploadJob::new(user, UploadKind::BulkItem, vec![MediaRef::new("file-1")])
}

#[tokio::test]
async fn test_insert_and_get_schedule() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(1);
    let run_at = Utc::now() + Duration::hours(2);

    let id = db.insert_schedule(user, &sample_job(user), run_at).await.unwrap();
    assert!(id.0 > 0);

    let row = db.get_schedule(id).await.unwrap().unwrap();
    assert_eq!(row.owner(), user);
    assert_eq!(row.run_at, run_at.timestamp());
    assert_eq!(ScheduleStatus::from_i32(row.status), ScheduleStatus::Pending);
    assert_eq!(row.job().unwrap().kind, UploadKind::BulkItem);

    db.close().await;
}

#[tokio::test]
async fn test_batch_insert_is_atomic() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(2);
    let now = Utc::now();

    let entries: Vec<_> = (0..5)
        .map(|i| (sample_job(user), now + Duration::minutes(30 * i)))
        .collect();
    let ids = db.insert_schedules(user, &entries).await.unwrap();
    assert_eq!(ids.len(), 5);

    let pending = db.pending_schedules_for_user(user).await.unwrap();
    assert_eq!(pending.len(), 5);

    // Soonest first
    for pair in pending.windows(2) {
        assert!(pair[0].run_at <= pair[1].run_at);
    }

    db.close().await;
}

#[tokio::test]
async fn test_due_schedules_excludes_future_and_claimed() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(3);
    let now = Utc::now();

    let due = db
        .insert_schedule(user, &sample_job(user), now - Duration::minutes(5))
        .await
        .unwrap();
    let claimed = db
        .insert_schedule(user, &sample_job(user), now - Duration::minutes(10))
        .await
        .unwrap();
    let _future = db
        .insert_schedule(user, &sample_job(user), now + Duration::hours(1))
        .await
        .unwrap();

    assert!(db.claim_schedule(claimed).await.unwrap());

    let rows = db.due_schedules(now).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].schedule_id(), due);

    db.close().await;
}

#[tokio::test]
async fn test_claim_is_exactly_once() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(4);

    let id = db
        .insert_schedule(user, &sample_job(user), Utc::now())
        .await
        .unwrap();

    // Many concurrent claimers, exactly one may win
    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = db.clone();
        handles.push(tokio::spawn(async move { db.claim_schedule(id).await }));
    }

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let row = db.get_schedule(id).await.unwrap().unwrap();
    assert_eq!(
        ScheduleStatus::from_i32(row.status),
        ScheduleStatus::Processing
    );

    db.close().await;
}

#[tokio::test]
async fn test_complete_and_fail_are_terminal() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(5);
    let now = Utc::now();

    let ok = db.insert_schedule(user, &sample_job(user), now).await.unwrap();
    let bad = db.insert_schedule(user, &sample_job(user), now).await.unwrap();

    assert!(db.claim_schedule(ok).await.unwrap());
    assert!(db.claim_schedule(bad).await.unwrap());

    db.complete_schedule(ok).await.unwrap();
    db.fail_schedule(bad, "media rejected").await.unwrap();

    let ok_row = db.get_schedule(ok).await.unwrap().unwrap();
    assert_eq!(
        ScheduleStatus::from_i32(ok_row.status),
        ScheduleStatus::Completed
    );
    assert!(ok_row.completed_at.is_some());

    let bad_row = db.get_schedule(bad).await.unwrap().unwrap();
    assert_eq!(
        ScheduleStatus::from_i32(bad_row.status),
        ScheduleStatus::Failed
    );
    assert_eq!(bad_row.error_message.as_deref(), Some("media rejected"));

    // Terminal entries are no longer claimable
    assert!(!db.claim_schedule(ok).await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_cancel_pending_leaves_claimed() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(6);
    let other = UserId(7);
    let now = Utc::now();

    let claimed = db.insert_schedule(user, &sample_job(user), now).await.unwrap();
    db.insert_schedule(user, &sample_job(user), now).await.unwrap();
    db.insert_schedule(user, &sample_job(user), now).await.unwrap();
    db.insert_schedule(other, &sample_job(other), now).await.unwrap();

    assert!(db.claim_schedule(claimed).await.unwrap());

    let removed = db.cancel_pending_for_user(user).await.unwrap();
    assert_eq!(removed, 2);

    // The claimed entry and the other user's entry survive
    assert!(db.get_schedule(claimed).await.unwrap().is_some());
    assert_eq!(db.pending_schedules_for_user(other).await.unwrap().len(), 1);

    db.close().await;
}
