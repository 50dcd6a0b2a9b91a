//! Core types and events for pubflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a user (owner of jobs, flows, and schedules)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new UserId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for UserId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for UserId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for UserId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Unique identifier for a persisted schedule entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub i64);

impl ScheduleId {
    /// Create a new ScheduleId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ScheduleId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for ScheduleId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ScheduleId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ScheduleId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Opaque handle to a piece of media held by the transport
///
/// The orchestration core never inspects the handle; it is passed back to
/// the transport's `download` call when the bytes are needed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    /// Create a new media reference
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

impl std::fmt::Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a location attachable to a published post
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationRef(pub String);

/// Kind of upload a job represents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    /// Single photo post
    Post,
    /// Short-form video
    Reel,
    /// Ephemeral story
    Story,
    /// Multi-media album (up to [`UploadKind::ALBUM_LIMIT`] items)
    Album,
    /// One item of a bulk-scheduled batch
    BulkItem,
}

impl UploadKind {
    /// Maximum media refs in an album
    pub const ALBUM_LIMIT: usize = 10;

    /// Convert integer code to UploadKind (sqlite storage)
    pub fn from_i32(kind: i32) -> Self {
        match kind {
            0 => UploadKind::Post,
            1 => UploadKind::Reel,
            2 => UploadKind::Story,
            3 => UploadKind::Album,
            4 => UploadKind::BulkItem,
            _ => UploadKind::Post,
        }
    }

    /// Convert UploadKind to integer code (sqlite storage)
    pub fn to_i32(self) -> i32 {
        match self {
            UploadKind::Post => 0,
            UploadKind::Reel => 1,
            UploadKind::Story => 2,
            UploadKind::Album => 3,
            UploadKind::BulkItem => 4,
        }
    }
}

impl std::fmt::Display for UploadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UploadKind::Post => "post",
            UploadKind::Reel => "reel",
            UploadKind::Story => "story",
            UploadKind::Album => "album",
            UploadKind::BulkItem => "bulk_item",
        };
        write!(f, "{}", s)
    }
}

/// Caption merge sentinel
///
/// The pipeline resolves the final caption by merging the job value with the
/// user's stored default: `Custom` always wins, `Default` falls back to the
/// stored default, and `None` suppresses the caption entirely even when a
/// default exists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caption {
    /// Use the user's stored default caption
    #[default]
    Default,
    /// Explicitly publish without a caption
    None,
    /// Caption supplied during the authoring flow
    Custom(String),
}

/// One authoring/publish attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadJob {
    /// User that owns this job
    pub owner_id: UserId,
    /// What is being published
    pub kind: UploadKind,
    /// Ordered media handles, 1..=10 depending on kind
    pub media_refs: Vec<MediaRef>,
    /// Caption override (merged with user defaults at publish time)
    pub caption: Caption,
    /// Usernames to tag on the published media
    pub tags: Vec<String>,
    /// Optional location attachment
    pub location: Option<LocationRef>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl UploadJob {
    /// Create a job with no caption override, tags, or location
    pub fn new(owner_id: UserId, kind: UploadKind, media_refs: Vec<MediaRef>) -> Self {
        Self {
            owner_id,
            kind,
            media_refs,
            caption: Caption::Default,
            tags: Vec::new(),
            location: None,
            created_at: Utc::now(),
        }
    }
}

/// Schedule entry status
///
/// Transitions are forward-only: pending entries are claimed to processing
/// exclusively by the scheduler daemon, and processing entries reach a
/// terminal state exclusively through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    /// Waiting for its run_at time
    Pending,
    /// Claimed by the daemon, pipeline in flight
    Processing,
    /// Published successfully
    Completed,
    /// Terminal failure
    Failed,
}

impl ScheduleStatus {
    /// Convert integer status code to ScheduleStatus (sqlite storage)
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => ScheduleStatus::Pending,
            1 => ScheduleStatus::Processing,
            2 => ScheduleStatus::Completed,
            3 => ScheduleStatus::Failed,
            _ => ScheduleStatus::Failed,
        }
    }

    /// Convert ScheduleStatus to integer code (sqlite storage)
    pub fn to_i32(self) -> i32 {
        match self {
            ScheduleStatus::Pending => 0,
            ScheduleStatus::Processing => 1,
            ScheduleStatus::Completed => 2,
            ScheduleStatus::Failed => 3,
        }
    }
}

/// User privilege tier
///
/// Gates the bulk batch-size limit and the caption length ceiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    /// Free tier
    #[default]
    Trial,
    /// Paid tier - larger batches, no caption ceiling
    Premium,
    /// Operator tier
    Admin,
}

impl UserTier {
    /// Whether this tier is exempt from the caption length ceiling
    pub fn is_privileged(self) -> bool {
        !matches!(self, UserTier::Trial)
    }

    /// Convert integer code to UserTier (sqlite storage)
    pub fn from_i32(tier: i32) -> Self {
        match tier {
            1 => UserTier::Premium,
            2 => UserTier::Admin,
            _ => UserTier::Trial,
        }
    }

    /// Convert UserTier to integer code (sqlite storage)
    pub fn to_i32(self) -> i32 {
        match self {
            UserTier::Trial => 0,
            UserTier::Premium => 1,
            UserTier::Admin => 2,
        }
    }
}

/// Per-user publishing defaults merged into every job at publish time
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserSettings {
    /// Default caption used when the job carries `Caption::Default`
    pub default_caption: String,
    /// Hashtag block appended to captions (or posted as first comment)
    pub hashtags: String,
    /// Post hashtags as the first comment instead of in the caption
    pub hashtags_in_first_comment: bool,
    /// Privilege tier
    pub tier: UserTier,
}

/// Identifier of a message previously sent through the transport
///
/// Returned by `send` so later progress updates can `edit` in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable per-user authoring flow state
///
/// One variant per pipeline step, each carrying only the fields meaningful
/// at that step. A user has at most one flow at a time; saving a new state
/// overwrites the old one. Serialized as JSON into the `user_flows` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FlowState {
    /// No authoring flow in progress
    Idle,
    /// Accumulating media refs until a "done" signal (or the kind's cap)
    CollectingMedia {
        /// Kind being authored
        kind: UploadKind,
        /// Refs collected so far
        media_refs: Vec<MediaRef>,
        /// Kind- and tier-specific cap on refs
        limit: usize,
    },
    /// Media collected, waiting for a caption or an explicit skip
    AwaitingCaption {
        /// The job under construction
        job: UploadJob,
    },
    /// Media fetched and previewed, waiting for options or dispatch
    AwaitingOptions {
        /// The job under construction
        job: UploadJob,
        /// Media fetched for preview; purged on timeout or cancel
        fetched_path: Option<std::path::PathBuf>,
    },
    /// Bulk batch collected, waiting for a shared caption, per-item
    /// captions, or skip
    AwaitingBulkCaptions {
        /// Refs collected for the batch
        media_refs: Vec<MediaRef>,
    },
    /// Bulk batch captioned, waiting for a distribution policy
    AwaitingSchedulePolicy {
        /// One job per batch item
        jobs: Vec<UploadJob>,
    },
    /// Handed to the pipeline; flow resets to Idle on any terminal outcome
    Dispatched {
        /// Kind that was dispatched
        kind: UploadKind,
    },
}

impl FlowState {
    /// Short label for logging
    pub fn step_name(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::CollectingMedia { .. } => "collecting_media",
            FlowState::AwaitingCaption { .. } => "awaiting_caption",
            FlowState::AwaitingOptions { .. } => "awaiting_options",
            FlowState::AwaitingBulkCaptions { .. } => "awaiting_bulk_captions",
            FlowState::AwaitingSchedulePolicy { .. } => "awaiting_schedule_policy",
            FlowState::Dispatched { .. } => "dispatched",
        }
    }
}

/// Identifiers returned by the publish collaborator for a published post
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedMedia {
    /// Platform-assigned media identifier
    pub media_id: String,
    /// Public URL of the published post
    pub url: String,
}

/// Events emitted by the orchestrator
///
/// Consumers subscribe via [`crate::UploadOrchestrator::subscribe`]. Events are
/// observability signals; user-facing messaging goes through the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A pipeline run acquired its permit and started
    UploadStarted {
        /// Owner of the job
        user_id: UserId,
        /// What is being published
        kind: UploadKind,
    },
    /// A pipeline run published successfully
    UploadComplete {
        /// Owner of the job
        user_id: UserId,
        /// Platform identifiers of the published media
        media: PublishedMedia,
    },
    /// A pipeline run failed
    UploadFailed {
        /// Owner of the job
        user_id: UserId,
        /// Failure description
        error: String,
    },
    /// A batch of deferred jobs was persisted
    BulkScheduled {
        /// Owner of the batch
        user_id: UserId,
        /// Number of entries created
        count: usize,
    },
    /// The daemon claimed a due schedule entry
    ScheduleClaimed {
        /// The claimed entry
        schedule_id: ScheduleId,
        /// Owner of the entry
        user_id: UserId,
    },
    /// An authoring flow was reset by the inactivity timeout
    FlowTimedOut {
        /// Owner of the flow
        user_id: UserId,
    },
    /// The orchestrator is shutting down
    Shutdown,
}
