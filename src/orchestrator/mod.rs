//! Core orchestrator implementation split into focused submodules.
//!
//! The `UploadOrchestrator` struct and its methods are organized by domain:
//! - [`flow`] - Interactive authoring state machine
//! - [`pipeline`] - Upload execution (fetch, transform, publish, cleanup)
//! - [`bulk`] - Bulk schedule computation and persistence
//! - [`daemon`] - Scheduler daemon polling and claiming due entries
//! - [`lifecycle`] - Startup and shutdown coordination

mod bulk;
mod daemon;
mod flow;
mod lifecycle;
mod pipeline;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use daemon::SchedulerDaemon;
pub use flow::FlowAction;

use crate::clients::{MediaTransform, PublishClient, Transport};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::gate::ConcurrencyGate;
use crate::registry::TaskRegistry;
use crate::retry::{RetryPolicy, with_rate_limit_retry};
use crate::types::{Event, UserId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct UploadOrchestrator {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query schedule status
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Global permit pool and per-user exclusion slots
    pub(crate) gate: Arc<ConcurrencyGate>,
    /// In-flight background task tracking
    pub(crate) registry: TaskRegistry,
    /// Chat transport collaborator
    pub(crate) transport: Arc<dyn Transport>,
    /// Publishing platform collaborator
    pub(crate) publisher: Arc<dyn PublishClient>,
    /// Media transform collaborator
    pub(crate) transform: Arc<dyn MediaTransform>,
    /// When set, the daemon skips claiming due entries
    pub(crate) schedules_paused: Arc<AtomicBool>,
    /// Root cancellation token; cancelled once, at shutdown
    pub(crate) shutdown: CancellationToken,
    /// Join handle of the running scheduler daemon, awaited at shutdown
    pub(crate) scheduler_task: Arc<std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
    /// Bounded retry used on broadcast notification paths
    pub(crate) retry_policy: RetryPolicy,
}

impl UploadOrchestrator {
    /// Create a new UploadOrchestrator instance
    ///
    /// This initializes all core components:
    /// - Creates the temp media directory
    /// - Opens/creates the SQLite database and runs migrations
    /// - Sets up the event broadcast channel and the concurrency gate
    ///
    /// The scheduler daemon is not started here; call
    /// [`UploadOrchestrator::start_scheduler`] once the instance is wired up.
    pub async fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        publisher: Arc<dyn PublishClient>,
        transform: Arc<dyn MediaTransform>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.temp_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir.display(),
                        e
                    ),
                ))
            })?;

        let db = Database::new(&config.database_path).await?;

        // Buffered channel; a subscriber more than 1000 events behind sees
        // RecvError::Lagged instead of blocking the orchestrator.
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let gate = Arc::new(ConcurrencyGate::new(config.max_concurrent_uploads));
        let schedules_paused = Arc::new(AtomicBool::new(config.schedules_paused));

        Ok(Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            gate,
            registry: TaskRegistry::new(),
            transport,
            publisher,
            transform,
            schedules_paused,
            shutdown: CancellationToken::new(),
            scheduler_task: Arc::new(std::sync::Mutex::new(None)),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Subscribe to orchestrator events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers (no-op when nobody is listening)
    pub(crate) fn emit_event(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Replace the global upload concurrency limit at runtime
    ///
    /// Permits already held drain against the old bound; the new bound
    /// applies to subsequent acquisitions.
    pub fn set_max_concurrent_uploads(&self, max_concurrent: usize) -> Result<()> {
        if max_concurrent == 0 {
            return Err(Error::Config {
                message: "max_concurrent_uploads must be at least 1".to_string(),
                key: Some("max_concurrent_uploads".to_string()),
            });
        }
        self.gate.set_limit(max_concurrent);
        Ok(())
    }

    /// Suspend or resume schedule claiming
    ///
    /// While paused, due entries stay pending; nothing already claimed is
    /// interrupted.
    pub fn set_schedules_paused(&self, paused: bool) {
        self.schedules_paused.store(paused, Ordering::SeqCst);
        tracing::info!(paused, "Schedule claiming toggled");
    }

    /// Whether schedule claiming is currently suspended
    pub fn schedules_paused(&self) -> bool {
        self.schedules_paused.load(Ordering::SeqCst)
    }

    /// Whether the user currently has an operation in flight
    pub fn user_busy(&self, user_id: UserId) -> bool {
        self.gate.user_busy(user_id)
    }

    /// Send a message to a set of users, retrying once per user on rate
    /// limiting
    ///
    /// Delivery failures are logged and skipped; one unreachable user does
    /// not abort the broadcast. Returns the number of users reached.
    pub async fn broadcast(&self, users: &[UserId], text: &str) -> usize {
        let mut delivered = 0;
        for &user in users {
            let result = with_rate_limit_retry(&self.retry_policy, || async {
                self.transport.send(user, text).await
            })
            .await;

            match result {
                Ok(_) => delivered += 1,
                Err(e) => {
                    tracing::warn!(user_id = %user, error = %e, "Broadcast delivery failed");
                }
            }
        }
        tracing::info!(
            delivered,
            total = users.len(),
            "Broadcast finished"
        );
        delivered
    }
}
