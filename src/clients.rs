//! Collaborator contracts consumed by the orchestration core
//!
//! The chat transport, the publishing platform client, and the media
//! transform are external systems. The core only depends on these traits;
//! concrete implementations (and their protocol details) live outside the
//! crate. Tests use in-memory implementations.

use crate::config::TransformSettings;
use crate::error::{PublishError, Result};
use crate::types::{LocationRef, MediaRef, MessageId, PublishedMedia, UploadKind, UserId};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Chat transport: media fetching and user-facing messaging
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve an opaque media handle to a local file
    ///
    /// The returned path is owned by the caller, which is responsible for
    /// deleting it when the pipeline run finishes.
    async fn download(&self, media: &MediaRef) -> Result<PathBuf>;

    /// Send a message to a user, returning its id for later edits
    async fn send(&self, user: UserId, text: &str) -> Result<MessageId>;

    /// Edit a previously sent message in place
    async fn edit(&self, user: UserId, message: MessageId, text: &str) -> Result<()>;
}

/// Everything the publish collaborator needs for one post
#[derive(Clone, Debug)]
pub struct PublishRequest {
    /// What is being published
    pub kind: UploadKind,
    /// Local media files, in display order
    pub paths: Vec<PathBuf>,
    /// Final resolved caption (None = publish without caption)
    pub caption: Option<String>,
    /// Usernames to tag
    pub tags: Vec<String>,
    /// Optional location attachment
    pub location: Option<LocationRef>,
}

/// External publishing platform client
///
/// Faults are typed ([`PublishError`]) so the pipeline can distinguish
/// auth-required, rejected-media, transient, and unknown failures.
#[async_trait]
pub trait PublishClient: Send + Sync {
    /// Publish media to the platform
    async fn publish(
        &self,
        user: UserId,
        request: PublishRequest,
    ) -> std::result::Result<PublishedMedia, PublishError>;

    /// Post a comment under already-published media (used for the
    /// hashtags-in-first-comment setting)
    async fn comment(
        &self,
        user: UserId,
        media_id: &str,
        text: &str,
    ) -> std::result::Result<(), PublishError>;
}

/// Media transform collaborator (format normalization, watermarking)
///
/// `transform` is an idempotent pure function of its inputs: the same input
/// file with the same settings always yields the same output path, and the
/// source file is never modified. The pipeline invokes it at most once per
/// file per run.
#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Whether the file needs transformation before publishing
    fn needs_transform(&self, path: &Path) -> bool;

    /// Produce a transformed copy, returning its path
    async fn transform(&self, path: &Path, settings: &TransformSettings) -> Result<PathBuf>;
}
