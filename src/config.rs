//! Configuration types for pubflow

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Inactivity timeout for a flow parked in the options step (fixed)
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(600);

/// Scheduler daemon polling interval (fixed)
pub const DAEMON_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Caption length ceiling for non-privileged users
pub const CAPTION_LIMIT: usize = 280;

/// Bulk batch-size limits per user tier
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BulkLimits {
    /// Maximum batch size for trial users (default: 5)
    #[serde(default = "default_trial_limit")]
    pub trial: usize,

    /// Maximum batch size for premium users (default: 20)
    #[serde(default = "default_premium_limit")]
    pub premium: usize,

    /// Maximum batch size for admins (default: 50)
    #[serde(default = "default_admin_limit")]
    pub admin: usize,
}

impl Default for BulkLimits {
    fn default() -> Self {
        Self {
            trial: default_trial_limit(),
            premium: default_premium_limit(),
            admin: default_admin_limit(),
        }
    }
}

impl BulkLimits {
    /// Batch-size limit for the given tier
    pub fn for_tier(&self, tier: crate::types::UserTier) -> usize {
        match tier {
            crate::types::UserTier::Trial => self.trial,
            crate::types::UserTier::Premium => self.premium,
            crate::types::UserTier::Admin => self.admin,
        }
    }
}

/// A named local time-of-day window used by the bounded-window schedule policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingWindow {
    /// Window start (local time-of-day, HH:MM:SS)
    #[serde(with = "time_format")]
    pub start: NaiveTime,

    /// Window end (local time-of-day, HH:MM:SS)
    #[serde(with = "time_format")]
    pub end: NaiveTime,
}

/// Watermark and format-normalization settings handed to the transform collaborator
///
/// The core never interprets these; it passes them through so that the same
/// input plus the same settings always yields the same output path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Apply a watermark during transform
    #[serde(default)]
    pub watermark_enabled: bool,

    /// Watermark text (ignored when watermarking is disabled)
    #[serde(default)]
    pub watermark_text: String,

    /// Watermark placement hint (e.g., "bottom_right")
    #[serde(default = "default_watermark_position")]
    pub watermark_position: String,
}

/// Main configuration for the upload orchestrator
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path (default: "./pubflow.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory for fetched and transformed media files (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Global upload concurrency bound (default: 15, hot-reloadable via
    /// [`crate::UploadOrchestrator::set_max_concurrent_uploads`])
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// Maximum media file size in megabytes, admins exempt (default: 250)
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Bulk batch-size limits per user tier
    #[serde(default)]
    pub bulk_limits: BulkLimits,

    /// Named scheduling windows for the bounded-window policy
    /// (defaults: morning 06:00-09:00, evening 18:00-21:00)
    #[serde(default = "default_scheduling_windows")]
    pub scheduling_windows: HashMap<String, SchedulingWindow>,

    /// Local timezone offset from UTC in minutes, applied when anchoring
    /// daily and windowed schedules (default: 0)
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Start with schedule claiming suspended (default: false)
    #[serde(default)]
    pub schedules_paused: bool,

    /// Settings passed through to the media transform collaborator
    #[serde(default)]
    pub transform: TransformSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            temp_dir: default_temp_dir(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
            max_file_size_mb: default_max_file_size_mb(),
            bulk_limits: BulkLimits::default(),
            scheduling_windows: default_scheduling_windows(),
            utc_offset_minutes: 0,
            schedules_paused: false,
            transform: TransformSettings::default(),
        }
    }
}

impl Config {
    /// Maximum media file size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Look up a named scheduling window
    pub fn window(&self, name: &str) -> Option<SchedulingWindow> {
        self.scheduling_windows.get(name).copied()
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./pubflow.db")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_concurrent_uploads() -> usize {
    15
}

fn default_max_file_size_mb() -> u64 {
    250
}

fn default_trial_limit() -> usize {
    5
}

fn default_premium_limit() -> usize {
    20
}

fn default_admin_limit() -> usize {
    50
}

fn default_watermark_position() -> String {
    "bottom_right".to_string()
}

fn default_scheduling_windows() -> HashMap<String, SchedulingWindow> {
    let mut windows = HashMap::new();
    if let (Some(m_start), Some(m_end), Some(e_start), Some(e_end)) = (
        NaiveTime::from_hms_opt(6, 0, 0),
        NaiveTime::from_hms_opt(9, 0, 0),
        NaiveTime::from_hms_opt(18, 0, 0),
        NaiveTime::from_hms_opt(21, 0, 0),
    ) {
        windows.insert(
            "morning".to_string(),
            SchedulingWindow {
                start: m_start,
                end: m_end,
            },
        );
        windows.insert(
            "evening".to_string(),
            SchedulingWindow {
                start: e_start,
                end: e_end,
            },
        );
    }
    windows
}

/// Serde module for serializing/deserializing NaiveTime as HH:MM:SS strings
mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = time.format("%H:%M:%S").to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
            .map_err(serde::de::Error::custom)
    }
}
