//! Startup and shutdown coordination.

use crate::error::Result;
use crate::types::Event;

use super::UploadOrchestrator;

impl UploadOrchestrator {
    /// Gracefully shut down the orchestrator
    ///
    /// Sequence:
    /// 1. Cancels the shutdown token, stopping the scheduler daemon and any
    ///    step-boundary check inside in-flight pipelines
    /// 2. Closes the global permit pool so no new run gets admitted
    /// 3. Waits for the scheduler daemon to exit its poll loop
    /// 4. Drains the task registry (cancels every background task and waits
    ///    for terminal states; temp files are purged by each task's cleanup)
    /// 5. Emits the shutdown event
    ///
    /// The database pool closes when the last orchestrator clone is dropped.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.shutdown.cancel();
        self.gate.close();
        tracing::info!("Stopped accepting new uploads");

        let daemon = self
            .scheduler_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = daemon {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Scheduler daemon terminated abnormally");
                }
            }
            tracing::info!("Scheduler daemon stopped");
        }

        self.registry.drain_all().await;
        tracing::info!("All background tasks reached a terminal state");

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
