//! Bulk schedule persistence.
//!
//! [`crate::schedule::compute_run_times`] does the arithmetic; this module
//! enforces the tier batch limit, persists the batch atomically, and emits
//! the observability event.

use crate::error::{Error, Result};
use crate::schedule::{self, SchedulePolicy};
use crate::types::{Event, ScheduleId, UploadJob, UserId};
use chrono::Utc;

use super::UploadOrchestrator;

impl UploadOrchestrator {
    /// Persist a batch of jobs as deferred schedule entries
    ///
    /// Run times come from the policy; the whole batch is inserted in one
    /// transaction so a fault never leaves a partial batch behind.
    ///
    /// # Errors
    ///
    /// [`Error::LimitExceeded`] when the batch is larger than the user's
    /// tier allows, [`Error::InvalidPolicy`] when the policy cannot produce
    /// run times.
    pub async fn schedule_bulk(
        &self,
        user_id: UserId,
        jobs: Vec<UploadJob>,
        policy: &SchedulePolicy,
    ) -> Result<Vec<ScheduleId>> {
        let settings = self.db.get_settings(user_id).await?;
        let limit = self.config.bulk_limits.for_tier(settings.tier);
        if jobs.len() > limit {
            return Err(Error::LimitExceeded(format!(
                "batch of {} items, your limit is {}",
                jobs.len(),
                limit
            )));
        }

        let offset = schedule::offset_from_minutes(self.config.utc_offset_minutes)?;
        let run_times = schedule::compute_run_times(jobs.len(), policy, Utc::now(), offset)?;

        let entries: Vec<_> = jobs.into_iter().zip(run_times).collect();
        let ids = self.db.insert_schedules(user_id, &entries).await?;

        tracing::info!(
            user_id = %user_id,
            count = ids.len(),
            ?policy,
            "Bulk batch scheduled"
        );
        self.emit_event(Event::BulkScheduled {
            user_id,
            count: ids.len(),
        });

        Ok(ids)
    }

    /// Resolve a named scheduling window from config into a policy
    pub fn window_policy(&self, name: &str) -> Result<SchedulePolicy> {
        self.config
            .window(name)
            .map(SchedulePolicy::Window)
            .ok_or_else(|| Error::NotFound(format!("scheduling window '{}'", name)))
    }

    /// List a user's not-yet-claimed schedule entries, soonest first
    pub async fn pending_schedules(&self, user_id: UserId) -> Result<Vec<crate::db::ScheduleRow>> {
        self.db.pending_schedules_for_user(user_id).await
    }

    /// Delete all of a user's pending entries, returning how many were removed
    ///
    /// Entries already claimed by the daemon finish on their own.
    pub async fn cancel_pending_schedules(&self, user_id: UserId) -> Result<u64> {
        let removed = self.db.cancel_pending_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, removed, "Pending schedules cancelled");
        Ok(removed)
    }
}
