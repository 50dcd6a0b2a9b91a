//! Database layer for pubflow
//!
//! Handles SQLite persistence for authoring flow state, user settings,
//! schedule entries, and upload outcomes.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`flows`] — Per-user authoring flow snapshots
//! - [`settings`] — Per-user publishing defaults and tier
//! - [`schedules`] — Deferred job entries and the daemon's atomic claim
//! - [`outcomes`] — Published upload history

use crate::error::Result;
use crate::types::{ScheduleId, UploadJob, UserId};
use sqlx::{FromRow, sqlite::SqlitePool};

mod flows;
mod migrations;
mod outcomes;
mod schedules;
mod settings;

/// Schedule entry row from the database
///
/// The deferred job itself is stored as a JSON snapshot; use
/// [`ScheduleRow::job`] to decode it.
#[derive(Debug, Clone, FromRow)]
pub struct ScheduleRow {
    /// Unique database ID
    pub id: i64,
    /// Owner of the entry
    pub user_id: i64,
    /// JSON snapshot of the deferred [`UploadJob`]
    pub job: String,
    /// Unix timestamp the entry becomes due
    pub run_at: i64,
    /// Current status (0=pending, 1=processing, 2=completed, 3=failed)
    pub status: i32,
    /// Unix timestamp the entry was created
    pub created_at: i64,
    /// Unix timestamp the entry reached a terminal state
    pub completed_at: Option<i64>,
    /// Failure description for failed entries
    pub error_message: Option<String>,
}

impl ScheduleRow {
    /// The entry's id as a typed identifier
    pub fn schedule_id(&self) -> ScheduleId {
        ScheduleId(self.id)
    }

    /// The entry's owner as a typed identifier
    pub fn owner(&self) -> UserId {
        UserId(self.user_id)
    }

    /// Decode the deferred job snapshot
    pub fn job(&self) -> Result<UploadJob> {
        Ok(serde_json::from_str(&self.job)?)
    }
}

/// Upload outcome row from the database
#[derive(Debug, Clone, FromRow)]
pub struct OutcomeRow {
    /// Unique database ID
    pub id: i64,
    /// User that published
    pub user_id: i64,
    /// Platform-assigned media identifier
    pub media_id: String,
    /// Public URL of the published post
    pub url: String,
    /// Upload kind (integer-coded [`crate::types::UploadKind`])
    pub kind: i32,
    /// Final caption that was published
    pub caption: Option<String>,
    /// Unix timestamp of publication
    pub created_at: i64,
}

/// SQLite-backed persistence for the orchestrator
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
