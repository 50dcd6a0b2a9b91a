//! Interactive authoring state machine.
//!
//! Chat input arrives as [`FlowAction`]s. Each action is validated against
//! the user's persisted [`FlowState`]; an action that does not fit the
//! current step is stale input (an old button, a late message) and is logged
//! at debug and ignored rather than treated as an error.
//!
//! A flow parked mid-conversation is reset by a 600 s inactivity timeout,
//! armed as a registry task named `"timeout"`. Every legitimate transition
//! re-arms it; dispatch and cancel tear it down.

use crate::config::{CAPTION_LIMIT, INACTIVITY_TIMEOUT};
use crate::error::{Error, Result};
use crate::schedule::SchedulePolicy;
use crate::types::{
    Caption, Event, FlowState, LocationRef, MediaRef, UploadJob, UploadKind, UserId,
};
use std::path::Path;

use super::UploadOrchestrator;

/// One unit of chat input, already decoded by the embedding application
#[derive(Clone, Debug)]
pub enum FlowAction {
    /// Start a new authoring flow (restarts any flow already in progress)
    Begin {
        /// What kind of upload to author
        kind: UploadKind,
    },
    /// Attach one media handle to the flow
    AddMedia {
        /// Opaque handle resolvable through the transport
        media: MediaRef,
    },
    /// Finish collecting media and move on
    MediaDone,
    /// Provide a caption
    Caption {
        /// Caption text
        text: String,
    },
    /// Skip the caption step, falling back to the user's stored default
    SkipCaption,
    /// Provide one caption per bulk batch item
    ///
    /// Rejected through the transport when the count does not match the
    /// number of collected items.
    BulkCaptions {
        /// Captions, in the order the media was collected
        captions: Vec<String>,
    },
    /// Tag users on the media
    TagUsers {
        /// Usernames to tag
        tags: Vec<String>,
    },
    /// Attach a location
    SetLocation {
        /// Opaque location reference
        location: LocationRef,
    },
    /// Dispatch the job to the pipeline immediately
    PublishNow,
    /// Persist the bulk batch as deferred schedule entries
    ScheduleBulk {
        /// Distribution policy for the batch
        policy: SchedulePolicy,
    },
    /// Abandon the flow
    Cancel,
}

impl UploadOrchestrator {
    /// Feed one action into the user's authoring flow
    ///
    /// Actions that do not match the current step are ignored. Errors
    /// returned here are infrastructure failures (database, transport), not
    /// user mistakes; user mistakes are answered through the transport.
    pub async fn handle_action(&self, user_id: UserId, action: FlowAction) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let state = self.db.get_flow(user_id).await?;
        tracing::debug!(
            user_id = %user_id,
            step = state.step_name(),
            "Handling flow action"
        );

        match (state, action) {
            (state, FlowAction::Begin { kind }) => self.begin_flow(user_id, kind, state).await,
            (state, FlowAction::Cancel) => self.cancel_flow(user_id, state).await,

            (
                FlowState::CollectingMedia {
                    kind,
                    media_refs,
                    limit,
                },
                FlowAction::AddMedia { media },
            ) => self.add_media(user_id, kind, media_refs, limit, media).await,

            (
                FlowState::CollectingMedia {
                    kind, media_refs, ..
                },
                FlowAction::MediaDone,
            ) => self.finish_collecting(user_id, kind, media_refs).await,

            (FlowState::AwaitingCaption { job }, FlowAction::Caption { text }) => {
                self.apply_caption(user_id, job, Caption::Custom(text)).await
            }
            (FlowState::AwaitingCaption { job }, FlowAction::SkipCaption) => {
                self.apply_caption(user_id, job, Caption::Default).await
            }

            (
                FlowState::AwaitingBulkCaptions { media_refs },
                FlowAction::Caption { text },
            ) => {
                let captions = vec![Caption::Custom(text); media_refs.len()];
                self.apply_bulk_captions(user_id, media_refs, captions).await
            }
            (FlowState::AwaitingBulkCaptions { media_refs }, FlowAction::SkipCaption) => {
                let captions = vec![Caption::Default; media_refs.len()];
                self.apply_bulk_captions(user_id, media_refs, captions).await
            }
            (
                FlowState::AwaitingBulkCaptions { media_refs },
                FlowAction::BulkCaptions { captions },
            ) => {
                self.apply_item_captions(user_id, media_refs, captions)
                    .await
            }

            (
                FlowState::AwaitingOptions { mut job, fetched_path },
                FlowAction::TagUsers { tags },
            ) => {
                job.tags = tags;
                self.db
                    .save_flow(user_id, &FlowState::AwaitingOptions { job, fetched_path })
                    .await?;
                self.arm_timeout(user_id);
                self.transport
                    .send(user_id, "Tags saved. Publish when ready.")
                    .await?;
                Ok(())
            }
            (
                FlowState::AwaitingOptions { mut job, fetched_path },
                FlowAction::SetLocation { location },
            ) => {
                job.location = Some(location);
                self.db
                    .save_flow(user_id, &FlowState::AwaitingOptions { job, fetched_path })
                    .await?;
                self.arm_timeout(user_id);
                self.transport
                    .send(user_id, "Location saved. Publish when ready.")
                    .await?;
                Ok(())
            }

            (FlowState::AwaitingOptions { job, fetched_path }, FlowAction::PublishNow) => {
                self.dispatch(user_id, job, fetched_path).await
            }

            (
                FlowState::AwaitingSchedulePolicy { jobs },
                FlowAction::ScheduleBulk { policy },
            ) => self.dispatch_bulk(user_id, jobs, policy).await,

            (state, action) => {
                // Stale input: an old button press or a message that arrived
                // after the step moved on.
                tracing::debug!(
                    user_id = %user_id,
                    step = state.step_name(),
                    ?action,
                    "Ignoring action that does not match the current step"
                );
                Ok(())
            }
        }
    }

    async fn begin_flow(
        &self,
        user_id: UserId,
        kind: UploadKind,
        prior: FlowState,
    ) -> Result<()> {
        if self.gate.user_busy(user_id) {
            self.transport
                .send(
                    user_id,
                    "Another operation is already in progress. Please wait for it to finish.",
                )
                .await?;
            return Ok(());
        }

        purge_fetched(&prior).await;

        let settings = self.db.get_settings(user_id).await?;
        let limit = match kind {
            UploadKind::Post | UploadKind::Reel | UploadKind::Story => 1,
            UploadKind::Album => UploadKind::ALBUM_LIMIT,
            UploadKind::BulkItem => self.config.bulk_limits.for_tier(settings.tier),
        };

        self.db
            .save_flow(user_id, &FlowState::CollectingMedia {
                kind,
                media_refs: Vec::new(),
                limit,
            })
            .await?;
        self.arm_timeout(user_id);

        self.transport
            .send(
                user_id,
                &format!("Send your media (up to {}), then finish.", limit),
            )
            .await?;
        Ok(())
    }

    async fn add_media(
        &self,
        user_id: UserId,
        kind: UploadKind,
        mut media_refs: Vec<MediaRef>,
        limit: usize,
        media: MediaRef,
    ) -> Result<()> {
        if media_refs.len() >= limit {
            self.transport
                .send(
                    user_id,
                    &format!("Limit of {} media items reached. Finish or cancel.", limit),
                )
                .await?;
            return Ok(());
        }

        media_refs.push(media);
        let collected = media_refs.len();

        // Single-media kinds advance as soon as their one item arrives
        if collected == limit && limit == 1 {
            return self.finish_collecting(user_id, kind, media_refs).await;
        }

        self.db
            .save_flow(user_id, &FlowState::CollectingMedia {
                kind,
                media_refs,
                limit,
            })
            .await?;
        self.arm_timeout(user_id);

        self.transport
            .send(
                user_id,
                &format!("Added ({}/{}). Send more or finish.", collected, limit),
            )
            .await?;
        Ok(())
    }

    async fn finish_collecting(
        &self,
        user_id: UserId,
        kind: UploadKind,
        media_refs: Vec<MediaRef>,
    ) -> Result<()> {
        if media_refs.is_empty() {
            self.transport
                .send(user_id, "No media received yet. Send at least one item.")
                .await?;
            return Ok(());
        }

        let next = if kind == UploadKind::BulkItem {
            FlowState::AwaitingBulkCaptions { media_refs }
        } else {
            FlowState::AwaitingCaption {
                job: UploadJob::new(user_id, kind, media_refs),
            }
        };
        self.db.save_flow(user_id, &next).await?;
        self.arm_timeout(user_id);

        let prompt = if kind == UploadKind::BulkItem {
            "Send one caption for the whole batch, one caption per item, or skip."
        } else {
            "Send a caption, or skip to use your default."
        };
        self.transport.send(user_id, prompt).await?;
        Ok(())
    }

    async fn apply_caption(
        &self,
        user_id: UserId,
        mut job: UploadJob,
        caption: Caption,
    ) -> Result<()> {
        if !self.caption_fits(user_id, &caption).await? {
            return Ok(());
        }
        job.caption = caption;

        // Best-effort preview fetch; the pipeline fetches its own copy at
        // publish time.
        let fetched_path = match self.transport.download(&job.media_refs[0]).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Preview fetch failed");
                None
            }
        };

        self.db
            .save_flow(user_id, &FlowState::AwaitingOptions { job, fetched_path })
            .await?;
        self.arm_timeout(user_id);

        self.transport
            .send(user_id, "Ready. Tag users, set a location, or publish.")
            .await?;
        Ok(())
    }

    /// One caption per batch item, supplied by the user in collection order
    async fn apply_item_captions(
        &self,
        user_id: UserId,
        media_refs: Vec<MediaRef>,
        captions: Vec<String>,
    ) -> Result<()> {
        if captions.len() != media_refs.len() {
            // The batch stays parked at the caption step
            self.arm_timeout(user_id);
            self.transport
                .send(
                    user_id,
                    &format!(
                        "You sent {} captions but have {} items. Send one caption per item.",
                        captions.len(),
                        media_refs.len()
                    ),
                )
                .await?;
            return Ok(());
        }

        let captions = captions.into_iter().map(Caption::Custom).collect();
        self.apply_bulk_captions(user_id, media_refs, captions).await
    }

    async fn apply_bulk_captions(
        &self,
        user_id: UserId,
        media_refs: Vec<MediaRef>,
        captions: Vec<Caption>,
    ) -> Result<()> {
        for caption in &captions {
            if !self.caption_fits(user_id, caption).await? {
                return Ok(());
            }
        }

        let jobs: Vec<UploadJob> = media_refs
            .into_iter()
            .zip(captions)
            .map(|(media, caption)| {
                let mut job = UploadJob::new(user_id, UploadKind::BulkItem, vec![media]);
                job.caption = caption;
                job
            })
            .collect();

        self.db
            .save_flow(user_id, &FlowState::AwaitingSchedulePolicy { jobs })
            .await?;
        self.arm_timeout(user_id);

        self.transport
            .send(user_id, "Choose a schedule policy for the batch.")
            .await?;
        Ok(())
    }

    /// Caption ceiling check for non-privileged tiers; answers through the
    /// transport when the caption is rejected
    async fn caption_fits(&self, user_id: UserId, caption: &Caption) -> Result<bool> {
        let Caption::Custom(text) = caption else {
            return Ok(true);
        };

        let settings = self.db.get_settings(user_id).await?;
        if !settings.tier.is_privileged() && text.chars().count() > CAPTION_LIMIT {
            self.transport
                .send(
                    user_id,
                    &format!(
                        "Caption is too long ({} characters, max {}).",
                        text.chars().count(),
                        CAPTION_LIMIT
                    ),
                )
                .await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn dispatch(
        &self,
        user_id: UserId,
        job: UploadJob,
        fetched_path: Option<std::path::PathBuf>,
    ) -> Result<()> {
        self.registry.cancel(user_id, "timeout");

        let slot = match self.gate.try_acquire_user(user_id) {
            Ok(slot) => slot,
            Err(Error::OperationInProgress) => {
                self.transport
                    .send(user_id, "Another operation is already in progress.")
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // The preview copy is no longer needed; the pipeline fetches fresh.
        if let Some(path) = fetched_path {
            remove_file_quiet(&path).await;
        }

        let kind = job.kind;
        self.db
            .save_flow(user_id, &FlowState::Dispatched { kind })
            .await?;

        let orchestrator = self.clone();
        self.registry.spawn(user_id, "upload", async move {
            orchestrator.run_pipeline(job, slot, None).await
        });

        self.transport.send(user_id, "Upload queued.").await?;
        Ok(())
    }

    async fn dispatch_bulk(
        &self,
        user_id: UserId,
        jobs: Vec<UploadJob>,
        policy: SchedulePolicy,
    ) -> Result<()> {
        match self.schedule_bulk(user_id, jobs, &policy).await {
            Ok(ids) => {
                self.registry.cancel(user_id, "timeout");
                self.db.clear_flow(user_id).await?;
                self.transport
                    .send(
                        user_id,
                        &format!("Scheduled {} uploads. You will be notified as each one runs.", ids.len()),
                    )
                    .await?;
                Ok(())
            }
            Err(e @ (Error::InvalidPolicy(_) | Error::LimitExceeded(_))) => {
                // The batch stays parked; the user can pick another policy
                self.transport
                    .send(user_id, &format!("Could not schedule the batch: {}", e))
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_flow(&self, user_id: UserId, state: FlowState) -> Result<()> {
        self.registry.cancel_all(user_id).await;
        purge_fetched(&state).await;
        self.db.clear_flow(user_id).await?;

        // Persisted schedule entries are untouched by a flow cancel
        self.transport.send(user_id, "Cancelled.").await?;
        Ok(())
    }

    /// (Re-)arm the inactivity timeout for a parked flow
    ///
    /// Spawning under the fixed name supersedes the previous timer, so every
    /// call restarts the 600 s countdown.
    pub(crate) fn arm_timeout(&self, user_id: UserId) {
        let orchestrator = self.clone();
        self.registry.spawn(user_id, "timeout", async move {
            tokio::time::sleep(INACTIVITY_TIMEOUT).await;

            let state = orchestrator.db.get_flow(user_id).await?;
            if state == FlowState::Idle {
                return Ok(());
            }

            tracing::info!(
                user_id = %user_id,
                step = state.step_name(),
                "Flow reset by inactivity timeout"
            );
            purge_fetched(&state).await;
            orchestrator.db.clear_flow(user_id).await?;
            if let Err(e) = orchestrator
                .transport
                .send(user_id, "Session timed out. Start again when ready.")
                .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "Timeout notice not delivered");
            }
            orchestrator.emit_event(Event::FlowTimedOut { user_id });
            Ok(())
        });
    }
}

/// Delete the preview file held by an options-step state, if any
async fn purge_fetched(state: &FlowState) {
    if let FlowState::AwaitingOptions {
        fetched_path: Some(path),
        ..
    } = state
    {
        remove_file_quiet(path).await;
    }
}

async fn remove_file_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete temp file");
        }
    }
}
