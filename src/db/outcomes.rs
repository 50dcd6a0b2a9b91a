//! Published upload history.

use crate::error::DatabaseError;
use crate::types::{PublishedMedia, UploadKind, UserId};
use crate::{Error, Result};

use super::{Database, OutcomeRow};

impl Database {
    /// Record a successful publication
    pub async fn insert_outcome(
        &self,
        user_id: UserId,
        kind: UploadKind,
        media: &PublishedMedia,
        caption: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO uploads (user_id, media_id, url, kind, caption, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&media.media_id)
        .bind(&media.url)
        .bind(kind.to_i32())
        .bind(caption)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert upload outcome: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List a user's publication history, newest first
    pub async fn list_outcomes(&self, user_id: UserId, limit: u32) -> Result<Vec<OutcomeRow>> {
        let rows = sqlx::query_as::<_, OutcomeRow>(
            r#"
            SELECT id, user_id, media_id, url, kind, caption, created_at
            FROM uploads
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list upload outcomes: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
