//! Upload execution: fetch, transform, publish, record, clean up.
//!
//! One pipeline run handles one job, interactive or scheduled. The run holds
//! the caller-provided per-user slot for its whole duration and takes a
//! global permit before doing any work, so the configured concurrency bound
//! is enforced at the entry of every run.
//!
//! Every file the run creates is tracked in a [`TempFileSet`]. The set is
//! purged explicitly on both the success and failure paths, and its `Drop`
//! removes whatever is left if the run's future is dropped mid-flight
//! (cancellation), so no temp file survives any exit path.

use crate::clients::PublishRequest;
use crate::error::{Error, PublishError, Result};
use crate::gate::UserSlot;
use crate::types::{
    Caption, Event, PublishedMedia, ScheduleId, UploadJob, UserSettings, UserTier,
};
use std::path::PathBuf;

use super::UploadOrchestrator;

/// Files created during a pipeline run, removed on every exit path
pub(crate) struct TempFileSet {
    paths: Vec<PathBuf>,
}

impl TempFileSet {
    pub(crate) fn new() -> Self {
        Self { paths: Vec::new() }
    }

    /// Register a file for cleanup
    pub(crate) fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Remove all tracked files now
    pub(crate) async fn purge(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete temp file");
                }
            }
        }
    }
}

impl Drop for TempFileSet {
    /// Last-resort cleanup when the run's future is dropped before the
    /// explicit purge (task cancellation).
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let _ = std::fs::remove_file(&path);
        }
    }
}

impl UploadOrchestrator {
    /// Execute one upload job end to end
    ///
    /// `slot` is the user's exclusion slot, acquired by the dispatcher and
    /// held until the run finishes. `schedule` ties a scheduled run to its
    /// entry so the terminal status lands on the entry; interactive runs
    /// reset the user's flow instead.
    pub(crate) async fn run_pipeline(
        &self,
        job: UploadJob,
        slot: UserSlot,
        schedule: Option<ScheduleId>,
    ) -> Result<()> {
        let user_id = job.owner_id;
        let _slot = slot;

        let mut temp = TempFileSet::new();
        let result = self.execute_pipeline(&job, &mut temp).await;
        temp.purge().await;

        match result {
            Ok(media) => {
                tracing::info!(
                    user_id = %user_id,
                    kind = %job.kind,
                    media_id = %media.media_id,
                    "Upload published"
                );
                self.emit_event(Event::UploadComplete { user_id, media });

                match schedule {
                    Some(id) => self.db.complete_schedule(id).await?,
                    None => self.db.clear_flow(user_id).await?,
                }
                Ok(())
            }
            Err(e) => {
                self.emit_event(Event::UploadFailed {
                    user_id,
                    error: e.to_string(),
                });

                // Best-effort bookkeeping; the original fault is what matters
                let terminal = match schedule {
                    Some(id) => self.db.fail_schedule(id, &e.to_string()).await,
                    None => self.db.clear_flow(user_id).await,
                };
                if let Err(db_err) = terminal {
                    tracing::error!(
                        user_id = %user_id,
                        error = %db_err,
                        "Failed to record upload failure"
                    );
                }

                let _ = self.transport.send(user_id, &user_message(&e)).await;
                Err(e)
            }
        }
    }

    async fn execute_pipeline(
        &self,
        job: &UploadJob,
        temp: &mut TempFileSet,
    ) -> Result<PublishedMedia> {
        let user_id = job.owner_id;

        let _permit = self.gate.acquire_global().await?;
        self.emit_event(Event::UploadStarted {
            user_id,
            kind: job.kind,
        });

        let settings = self.db.get_settings(user_id).await?;
        let (caption, first_comment) = resolve_caption(&job.caption, &settings);

        // Progress message; edits are cosmetic and never fail the run
        let status = self.transport.send(user_id, "Uploading...").await.ok();

        let total = job.media_refs.len();
        let mut paths = Vec::with_capacity(total);
        for (index, media) in job.media_refs.iter().enumerate() {
            self.ensure_running()?;

            let path = self.transport.download(media).await?;
            temp.track(path.clone());

            if settings.tier != UserTier::Admin {
                let size = tokio::fs::metadata(&path).await?.len();
                if size > self.config.max_file_size_bytes() {
                    return Err(Error::LimitExceeded(format!(
                        "file is {} MB, maximum is {} MB",
                        size / (1024 * 1024),
                        self.config.max_file_size_mb
                    )));
                }
            }

            if let Some(message) = status {
                let text = format!("Uploading... ({}/{})", index + 1, total);
                let _ = self.transport.edit(user_id, message, &text).await;
            }
            paths.push(path);
        }

        for path in paths.iter_mut() {
            self.ensure_running()?;
            if self.transform.needs_transform(path) {
                let transformed = self.transform.transform(path, &self.config.transform).await?;
                temp.track(transformed.clone());
                *path = transformed;
            }
        }

        self.ensure_running()?;
        let request = PublishRequest {
            kind: job.kind,
            paths,
            caption: caption.clone(),
            tags: job.tags.clone(),
            location: job.location.clone(),
        };
        let media = self
            .publisher
            .publish(user_id, request)
            .await
            .map_err(Error::Publish)?;

        // The post exists at this point; a failed comment downgrades the
        // outcome, it does not undo it.
        if let Some(comment) = first_comment {
            if let Err(e) = self
                .publisher
                .comment(user_id, &media.media_id, &comment)
                .await
            {
                tracing::warn!(
                    user_id = %user_id,
                    media_id = %media.media_id,
                    error = %e,
                    "First-comment hashtags failed"
                );
            }
        }

        self.db
            .insert_outcome(user_id, job.kind, &media, caption.as_deref())
            .await?;

        if let Some(message) = status {
            let text = format!("Published: {}", media.url);
            let _ = self.transport.edit(user_id, message, &text).await;
        }

        Ok(media)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            Err(Error::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

/// Merge the job's caption sentinel with the user's stored defaults
///
/// Returns the final caption and, when the user routes hashtags to a first
/// comment, the comment text.
fn resolve_caption(
    caption: &Caption,
    settings: &UserSettings,
) -> (Option<String>, Option<String>) {
    let base = match caption {
        Caption::Custom(text) => Some(text.clone()),
        Caption::None => None,
        Caption::Default => {
            if settings.default_caption.is_empty() {
                None
            } else {
                Some(settings.default_caption.clone())
            }
        }
    };

    if settings.hashtags.is_empty() {
        return (base, None);
    }

    if settings.hashtags_in_first_comment {
        (base, Some(settings.hashtags.clone()))
    } else {
        let merged = match base {
            Some(caption) => format!("{}\n\n{}", caption, settings.hashtags),
            None => settings.hashtags.clone(),
        };
        (Some(merged), None)
    }
}

/// Map a pipeline fault to the message shown to the user
fn user_message(error: &Error) -> String {
    match error {
        Error::Publish(PublishError::AuthRequired(_)) => {
            "Authentication required. Please log in again and retry.".to_string()
        }
        Error::Publish(PublishError::RejectedMedia { reason, .. }) => {
            format!("The platform rejected your media: {}", reason)
        }
        Error::Publish(PublishError::Transient(_)) => {
            "The platform is busy right now. Please try again in a few minutes.".to_string()
        }
        Error::LimitExceeded(detail) => format!("Limit exceeded: {}.", detail),
        Error::ShuttingDown => "The service is restarting. Please try again shortly.".to_string(),
        Error::Cancelled => "Upload cancelled.".to_string(),
        _ => "Upload failed. Please try again.".to_string(),
    }
}
