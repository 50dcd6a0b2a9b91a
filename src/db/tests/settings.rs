use crate::db::*;
use crate::types::{UserId, UserSettings, UserTier};
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_unknown_user_gets_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let settings = db.get_settings(UserId(5)).await.unwrap();
    assert_eq!(settings.default_caption, "");
    assert_eq!(settings.hashtags, "");
    assert!(!settings.hashtags_in_first_comment);
    assert_eq!(settings.tier, UserTier::Trial);

    db.close().await;
}

#[tokio::test]
async fn test_save_and_get_settings() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(11);

    let settings = UserSettings {
        default_caption: "new drop".to_string(),
        hashtags: "#photo #daily".to_string(),
        hashtags_in_first_comment: true,
        tier: UserTier::Premium,
    };
    db.save_settings(user, &settings).await.unwrap();

    let loaded = db.get_settings(user).await.unwrap();
    assert_eq!(loaded.default_caption, "new drop");
    assert_eq!(loaded.hashtags, "#photo #daily");
    assert!(loaded.hashtags_in_first_comment);
    assert_eq!(loaded.tier, UserTier::Premium);

    db.close().await;
}

#[tokio::test]
async fn test_save_settings_upserts() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let user = UserId(11);

    db.save_settings(user, &UserSettings::default()).await.unwrap();

    let updated = UserSettings {
        tier: UserTier::Admin,
        ..UserSettings::default()
    };
    db.save_settings(user, &updated).await.unwrap();

    let loaded = db.get_settings(user).await.unwrap();
    assert_eq!(loaded.tier, UserTier::Admin);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_settings")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);

    db.close().await;
}
