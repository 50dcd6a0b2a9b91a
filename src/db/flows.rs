//! Per-user authoring flow persistence.
//!
//! Each user has at most one flow row. The flow state is stored as a tagged
//! JSON document so that interrupted multi-step conversations survive a
//! process restart.

use crate::error::DatabaseError;
use crate::types::{FlowState, UserId};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Save (upsert) a user's authoring flow state
    pub async fn save_flow(&self, user_id: UserId, state: &FlowState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO user_flows (user_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save flow state: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Load a user's flow state, or `FlowState::Idle` if none is stored
    ///
    /// A stored state that no longer decodes (e.g. written by an older
    /// build) is treated as absent rather than failing the whole flow.
    pub async fn get_flow(&self, user_id: UserId) -> Result<FlowState> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT state FROM user_flows WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get flow state: {}",
                        e
                    )))
                })?;

        let Some(json) = json else {
            return Ok(FlowState::Idle);
        };

        match serde_json::from_str(&json) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Discarding undecodable flow state");
                self.clear_flow(user_id).await?;
                Ok(FlowState::Idle)
            }
        }
    }

    /// Remove a user's flow row, resetting them to idle
    pub async fn clear_flow(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM user_flows WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear flow state: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
