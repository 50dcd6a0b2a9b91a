//! # pubflow
//!
//! Backend library for chat-driven social media upload orchestration.
//!
//! ## Design Philosophy
//!
//! pubflow is designed to be:
//! - **Platform-agnostic** - The chat transport and the publishing platform
//!   are trait objects supplied by the embedding application
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use pubflow::{Config, FlowAction, UploadKind, UploadOrchestrator, UserId};
//! use std::sync::Arc;
//! # use pubflow::{MediaRef, MessageId, PublishedMedia};
//! # use pubflow::clients::{MediaTransform, PublishClient, PublishRequest, Transport};
//! # use pubflow::config::TransformSettings;
//! # use pubflow::error::PublishError;
//! # use std::path::{Path, PathBuf};
//! # struct MyTransport;
//! # #[async_trait::async_trait]
//! # impl Transport for MyTransport {
//! #     async fn download(&self, _: &MediaRef) -> pubflow::Result<PathBuf> { unimplemented!() }
//! #     async fn send(&self, _: UserId, _: &str) -> pubflow::Result<MessageId> { unimplemented!() }
//! #     async fn edit(&self, _: UserId, _: MessageId, _: &str) -> pubflow::Result<()> { unimplemented!() }
//! # }
//! # struct MyPublisher;
//! # #[async_trait::async_trait]
//! # impl PublishClient for MyPublisher {
//! #     async fn publish(&self, _: UserId, _: PublishRequest) -> Result<PublishedMedia, PublishError> { unimplemented!() }
//! #     async fn comment(&self, _: UserId, _: &str, _: &str) -> Result<(), PublishError> { unimplemented!() }
//! # }
//! # struct MyTransform;
//! # #[async_trait::async_trait]
//! # impl MediaTransform for MyTransform {
//! #     fn needs_transform(&self, _: &Path) -> bool { false }
//! #     async fn transform(&self, _: &Path, _: &TransformSettings) -> pubflow::Result<PathBuf> { unimplemented!() }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = UploadOrchestrator::new(
//!         Config::default(),
//!         Arc::new(MyTransport),
//!         Arc::new(MyPublisher),
//!         Arc::new(MyTransform),
//!     )
//!     .await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Background claiming of due scheduled uploads
//!     orchestrator.start_scheduler();
//!
//!     // Feed user input into the authoring state machine
//!     let user = UserId(42);
//!     orchestrator
//!         .handle_action(user, FlowAction::Begin { kind: UploadKind::Post })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Collaborator traits (chat transport, publish client, media transform)
pub mod clients;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Global and per-user upload admission control
pub mod gate;
/// Core orchestrator implementation (decomposed into focused submodules)
pub mod orchestrator;
/// Lifecycle tracking for in-flight background tasks
pub mod registry;
/// Retry logic for rate-limited transport calls
pub mod retry;
/// Schedule policies and run-time computation
pub mod schedule;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{BulkLimits, Config, SchedulingWindow};
pub use db::Database;
pub use error::{DatabaseError, Error, PublishError, Result, TransportError};
pub use orchestrator::{FlowAction, SchedulerDaemon, UploadOrchestrator};
pub use schedule::SchedulePolicy;
pub use types::{
    Caption, Event, FlowState, LocationRef, MediaRef, MessageId, PublishedMedia, ScheduleId,
    ScheduleStatus, UploadJob, UploadKind, UserId, UserSettings, UserTier,
};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls the orchestrator's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(orchestrator: UploadOrchestrator) -> Result<()> {
    wait_for_signal().await;
    orchestrator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
