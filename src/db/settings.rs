//! Per-user publishing defaults and tier.

use crate::error::DatabaseError;
use crate::types::{UserId, UserSettings, UserTier};
use crate::{Error, Result};
use sqlx::FromRow;

use super::Database;

#[derive(FromRow)]
struct SettingsRow {
    default_caption: Option<String>,
    hashtags: Option<String>,
    hashtags_in_first_comment: i64,
    tier: i64,
}

impl Database {
    /// Load a user's settings, falling back to defaults for unknown users
    pub async fn get_settings(&self, user_id: UserId) -> Result<UserSettings> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT default_caption, hashtags, hashtags_in_first_comment, tier
            FROM user_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get user settings: {}",
                e
            )))
        })?;

        let Some(row) = row else {
            return Ok(UserSettings::default());
        };

        Ok(UserSettings {
            default_caption: row.default_caption.unwrap_or_default(),
            hashtags: row.hashtags.unwrap_or_default(),
            hashtags_in_first_comment: row.hashtags_in_first_comment != 0,
            tier: UserTier::from_i32(row.tier as i32),
        })
    }

    /// Save (upsert) a user's settings
    pub async fn save_settings(&self, user_id: UserId, settings: &UserSettings) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO user_settings (
                user_id, default_caption, hashtags, hashtags_in_first_comment, tier, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                default_caption = excluded.default_caption,
                hashtags = excluded.hashtags,
                hashtags_in_first_comment = excluded.hashtags_in_first_comment,
                tier = excluded.tier,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&settings.default_caption)
        .bind(&settings.hashtags)
        .bind(settings.hashtags_in_first_comment as i64)
        .bind(settings.tier.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save user settings: {}",
                e
            )))
        })?;

        Ok(())
    }
}
