//! Lifecycle tracking for in-flight asynchronous operations
//!
//! Every background unit of work the orchestrator starts (pipeline runs,
//! inactivity timeouts, scheduled uploads) is registered here under an
//! `(owner, logical name)` key. Registering a new task under a key that is
//! already live cancels and replaces the old task, which is how a fresh user
//! action supersedes a stale in-flight one.
//!
//! Units of work run inside a wrapper that logs faults instead of letting
//! them escape, and distinguishes cancellation (debug) from failure (error).
//! [`TaskRegistry::drain_all`] cancels everything and waits for terminal
//! states; it is called once, at shutdown, so no orphaned work survives a
//! restart.

use crate::error::Result;
use crate::types::UserId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type TaskKey = (UserId, String);

struct TaskEntry {
    /// Generation counter so a finished task only removes its own entry,
    /// never the entry of the task that replaced it.
    seq: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Identifies a dispatched task for later targeted cancellation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskHandle {
    /// Owner the task was registered under
    pub owner: UserId,
    /// Logical name the task was registered under
    pub name: String,
}

/// Registry of all in-flight background tasks, keyed by owner and logical name
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<TaskKey, TaskEntry>>>,
    next_seq: Arc<AtomicU64>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn a unit of work under `(owner, name)`, superseding any live task
    /// with the same key
    ///
    /// The prior task, if any, is cancelled best-effort and non-blocking.
    /// Returns `None` when no tokio runtime is active - that is an
    /// environment error, logged here, and the operation silently no-ops so
    /// the process keeps running. Callers that need the task must check for
    /// a dispatched handle.
    pub fn spawn<F>(&self, owner: UserId, name: &str, work: F) -> Option<TaskHandle>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    user_id = owner.0,
                    task = name,
                    error = %e,
                    "Cannot spawn task: no active runtime"
                );
                return None;
            }
        };

        let key: TaskKey = (owner, name.to_string());
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let wrapper = {
            let tasks = Arc::clone(&self.tasks);
            let token = token.clone();
            let key = key.clone();
            async move {
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::debug!(user_id = key.0.0, task = %key.1, "Task cancelled");
                    }
                    result = work => {
                        if let Err(e) = result {
                            tracing::error!(
                                user_id = key.0.0,
                                task = %key.1,
                                error = %e,
                                "Background task failed"
                            );
                        }
                    }
                }

                let mut tasks = tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if tasks.get(&key).is_some_and(|entry| entry.seq == seq) {
                    tasks.remove(&key);
                }
            }
        };

        // The map lock is held across the spawn so the wrapper's own removal
        // cannot run before the entry is inserted.
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(prior) = tasks.remove(&key) {
            tracing::debug!(
                user_id = owner.0,
                task = name,
                "Superseding existing task with the same name"
            );
            prior.token.cancel();
        }

        let handle = runtime.spawn(wrapper);
        tasks.insert(key, TaskEntry { seq, token, handle });

        tracing::debug!(
            user_id = owner.0,
            task = name,
            tracked = tasks.len(),
            "Task registered"
        );

        Some(TaskHandle {
            owner,
            name: name.to_string(),
        })
    }

    /// Cancel one task by owner and logical name (best-effort, non-blocking)
    pub fn cancel(&self, owner: UserId, name: &str) {
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = tasks.remove(&(owner, name.to_string())) {
            entry.token.cancel();
            tracing::debug!(user_id = owner.0, task = name, "Task cancellation requested");
        }
    }

    /// Cancel every task belonging to an owner and wait for them to finish
    pub async fn cancel_all(&self, owner: UserId) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self
                .tasks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let keys: Vec<TaskKey> = tasks
                .keys()
                .filter(|(id, _)| *id == owner)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| tasks.remove(&key))
                .map(|entry| {
                    entry.token.cancel();
                    entry.handle
                })
                .collect()
        };

        if handles.is_empty() {
            return;
        }

        tracing::debug!(
            user_id = owner.0,
            count = handles.len(),
            "Waiting for cancelled user tasks"
        );
        futures::future::join_all(handles).await;
    }

    /// Cancel every tracked task and wait for all of them to reach a
    /// terminal state
    ///
    /// Used once, at process shutdown.
    pub async fn drain_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self
                .tasks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            tasks
                .drain()
                .map(|(_, entry)| {
                    entry.token.cancel();
                    entry.handle
                })
                .collect()
        };

        if handles.is_empty() {
            tracing::debug!("No outstanding tasks to drain");
            return;
        }

        tracing::info!(count = handles.len(), "Draining outstanding background tasks");
        futures::future::join_all(handles).await;
        tracing::info!("All background tasks drained");
    }

    /// Whether a task is currently tracked under `(owner, name)`
    pub fn is_tracked(&self, owner: UserId, name: &str) -> bool {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.contains_key(&(owner, name.to_string()))
    }

    /// Number of tracked tasks
    pub fn len(&self) -> usize {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_task_runs_and_unregisters() {
        let registry = TaskRegistry::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran2 = ran.clone();
        let handle = registry.spawn(UserId(1), "work", async move {
            ran2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(handle.is_some());

        // Give the task a moment to run and remove itself
        for _ in 0..50 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_latest_spawn_wins() {
        let registry = TaskRegistry::new();
        let completions = Arc::new(AtomicUsize::new(0));

        // First task waits forever unless cancelled
        let first_done = completions.clone();
        registry.spawn(UserId(7), "login", async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            first_done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(registry.len(), 1);

        // Second spawn under the same name supersedes the first
        let second_done = completions.clone();
        registry.spawn(UserId(7), "login", async move {
            second_done.fetch_add(100, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(registry.len(), 1);

        for _ in 0..50 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Only the replacement ran to completion
        assert_eq!(completions.load(Ordering::SeqCst), 100);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_is_swallowed() {
        let registry = TaskRegistry::new();

        let handle = registry.spawn(UserId(2), "doomed", async {
            Err(crate::error::Error::Internal("boom".to_string()))
        });
        assert!(handle.is_some());

        for _ in 0..50 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // The fault was logged, not propagated; the registry is clean
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_for_owner() {
        let registry = TaskRegistry::new();

        for name in ["upload", "timeout"] {
            registry.spawn(UserId(5), name, async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            });
        }
        registry.spawn(UserId(6), "upload", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        });
        assert_eq!(registry.len(), 3);

        registry.cancel_all(UserId(5)).await;
        assert!(!registry.is_tracked(UserId(5), "upload"));
        assert!(!registry.is_tracked(UserId(5), "timeout"));
        assert!(registry.is_tracked(UserId(6), "upload"));
    }

    #[tokio::test]
    async fn test_drain_all_reaches_terminal_states() {
        let registry = TaskRegistry::new();
        let interrupted = Arc::new(AtomicUsize::new(0));

        for i in 0..10 {
            let interrupted = interrupted.clone();
            registry.spawn(UserId(i), "work", async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                interrupted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(registry.len(), 10);

        registry.drain_all().await;

        assert!(registry.is_empty());
        // None of the long sleeps ran to completion
        assert_eq!(interrupted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_targeted_cancel() {
        let registry = TaskRegistry::new();
        registry.spawn(UserId(9), "timeout", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        assert!(registry.is_tracked(UserId(9), "timeout"));

        registry.cancel(UserId(9), "timeout");
        assert!(!registry.is_tracked(UserId(9), "timeout"));
    }
}
