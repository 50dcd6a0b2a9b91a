//! Scheduler daemon: polls for due entries and claims them.
//!
//! The daemon runs for the lifetime of the process and is stopped only by
//! the shutdown token. Each cycle it claims due pending entries with a
//! conditional update, so even if several daemons ever polled the same
//! database, an entry would be dispatched exactly once.

use crate::config::DAEMON_POLL_INTERVAL;
use crate::types::Event;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info};

use super::UploadOrchestrator;

/// Background task that dispatches due schedule entries
///
/// Construct with [`SchedulerDaemon::new`] and run with
/// [`SchedulerDaemon::run`], or use
/// [`UploadOrchestrator::start_scheduler`] to spawn it.
pub struct SchedulerDaemon {
    orchestrator: UploadOrchestrator,
}

impl SchedulerDaemon {
    /// Create a daemon bound to an orchestrator
    pub fn new(orchestrator: UploadOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Run the poll loop until shutdown
    pub async fn run(self) {
        info!("Scheduler daemon started");

        loop {
            tokio::select! {
                () = self.orchestrator.shutdown.cancelled() => {
                    info!("Scheduler daemon shutting down");
                    break;
                }
                () = sleep(DAEMON_POLL_INTERVAL) => {}
            }

            if self.orchestrator.schedules_paused() {
                debug!("Schedule claiming paused, skipping cycle");
                continue;
            }

            self.dispatch_due().await;
        }
    }

    /// Claim every due pending entry and hand each to the pipeline
    async fn dispatch_due(&self) {
        let due = match self.orchestrator.db.due_schedules(Utc::now()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query due schedules");
                return;
            }
        };

        if due.is_empty() {
            return;
        }
        debug!(count = due.len(), "Found due schedule entries");

        for row in due {
            let id = row.schedule_id();
            let user_id = row.owner();

            let claimed = match self.orchestrator.db.claim_schedule(id).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!(schedule_id = %id, error = %e, "Claim failed");
                    continue;
                }
            };
            if !claimed {
                // Someone else moved it out of pending first
                debug!(schedule_id = %id, "Entry already claimed");
                continue;
            }

            self.orchestrator
                .emit_event(Event::ScheduleClaimed {
                    schedule_id: id,
                    user_id,
                });

            let job = match row.job() {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(schedule_id = %id, error = %e, "Undecodable schedule entry");
                    if let Err(db_err) = self
                        .orchestrator
                        .db
                        .fail_schedule(id, "undecodable job snapshot")
                        .await
                    {
                        tracing::error!(schedule_id = %id, error = %db_err, "Failed to mark entry failed");
                    }
                    continue;
                }
            };

            let orchestrator = self.orchestrator.clone();
            let name = format!("scheduled_upload_{}", id);
            self.orchestrator.registry.spawn(user_id, &name, async move {
                // Scheduled runs queue behind an interactive operation
                // rather than rejecting it.
                let slot = orchestrator.gate.acquire_user(user_id).await;
                orchestrator.run_pipeline(job, slot, Some(id)).await
            });
        }
    }
}

impl UploadOrchestrator {
    /// Spawn the scheduler daemon onto the current runtime
    ///
    /// The handle is retained and awaited by
    /// [`UploadOrchestrator::shutdown`]. Starting again supersedes a daemon
    /// that is already running.
    pub fn start_scheduler(&self) {
        let daemon = SchedulerDaemon::new(self.clone());
        let handle = tokio::spawn(daemon.run());

        let mut slot = self
            .scheduler_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(prior) = slot.replace(handle) {
            prior.abort();
        }
    }
}
