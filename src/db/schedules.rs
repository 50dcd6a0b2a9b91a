//! Schedule entry CRUD and the daemon's atomic claim.

use crate::error::DatabaseError;
use crate::types::{ScheduleId, ScheduleStatus, UploadJob, UserId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

use super::{Database, ScheduleRow};

const SCHEDULE_COLUMNS: &str =
    "id, user_id, job, run_at, status, created_at, completed_at, error_message";

impl Database {
    /// Insert a new pending schedule entry
    pub async fn insert_schedule(
        &self,
        user_id: UserId,
        job: &UploadJob,
        run_at: DateTime<Utc>,
    ) -> Result<ScheduleId> {
        let json = serde_json::to_string(job)?;
        let now = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO schedules (user_id, job, run_at, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(json)
        .bind(run_at.timestamp())
        .bind(ScheduleStatus::Pending.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert schedule: {}",
                e
            )))
        })?;

        Ok(ScheduleId(result.last_insert_rowid()))
    }

    /// Insert a whole batch of pending entries in one transaction
    ///
    /// All entries land or none do, so a fault partway through a bulk save
    /// never leaves a half-persisted batch.
    pub async fn insert_schedules(
        &self,
        user_id: UserId,
        entries: &[(UploadJob, DateTime<Utc>)],
    ) -> Result<Vec<ScheduleId>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let now = Utc::now().timestamp();
        let mut ids = Vec::with_capacity(entries.len());

        for (job, run_at) in entries {
            let json = serde_json::to_string(job)?;
            let result = sqlx::query(
                r#"
                INSERT INTO schedules (user_id, job, run_at, status, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(json)
            .bind(run_at.timestamp())
            .bind(ScheduleStatus::Pending.to_i32())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert schedule batch entry: {}",
                    e
                )))
            })?;

            ids.push(ScheduleId(result.last_insert_rowid()));
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit schedule batch: {}",
                e
            )))
        })?;

        Ok(ids)
    }

    /// Get a schedule entry by ID
    pub async fn get_schedule(&self, id: ScheduleId) -> Result<Option<ScheduleRow>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {} FROM schedules WHERE id = ?",
            SCHEDULE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get schedule: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List pending entries that are due at or before `now`, oldest first
    pub async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleRow>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {} FROM schedules WHERE status = ? AND run_at <= ? ORDER BY run_at ASC",
            SCHEDULE_COLUMNS
        ))
        .bind(ScheduleStatus::Pending.to_i32())
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list due schedules: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Atomically claim a pending entry for processing
    ///
    /// The status predicate makes the claim exactly-once: only one caller
    /// can move an entry out of pending, concurrent claimers see zero rows
    /// affected and back off.
    pub async fn claim_schedule(&self, id: ScheduleId) -> Result<bool> {
        let result = sqlx::query("UPDATE schedules SET status = ? WHERE id = ? AND status = ?")
            .bind(ScheduleStatus::Processing.to_i32())
            .bind(id)
            .bind(ScheduleStatus::Pending.to_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to claim schedule: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark a processing entry completed
    pub async fn complete_schedule(&self, id: ScheduleId) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query("UPDATE schedules SET status = ?, completed_at = ? WHERE id = ?")
            .bind(ScheduleStatus::Completed.to_i32())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to complete schedule: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Mark a processing entry failed with a description
    pub async fn fail_schedule(&self, id: ScheduleId, error: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "UPDATE schedules SET status = ?, completed_at = ?, error_message = ? WHERE id = ?",
        )
        .bind(ScheduleStatus::Failed.to_i32())
        .bind(now)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fail schedule: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List a user's pending entries, soonest first
    pub async fn pending_schedules_for_user(&self, user_id: UserId) -> Result<Vec<ScheduleRow>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {} FROM schedules WHERE user_id = ? AND status = ? ORDER BY run_at ASC",
            SCHEDULE_COLUMNS
        ))
        .bind(user_id)
        .bind(ScheduleStatus::Pending.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list pending schedules: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Delete all of a user's pending entries, returning how many were removed
    ///
    /// Processing and terminal entries are untouched; a claimed entry
    /// belongs to the pipeline until it finishes.
    pub async fn cancel_pending_for_user(&self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schedules WHERE user_id = ? AND status = ?")
            .bind(user_id)
            .bind(ScheduleStatus::Pending.to_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to cancel pending schedules: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
