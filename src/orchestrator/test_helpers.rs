//! Shared test helpers: in-memory mock collaborators and an orchestrator
//! factory backed by a temp directory.

use crate::clients::{MediaTransform, PublishClient, PublishRequest, Transport};
use crate::config::{Config, TransformSettings};
use crate::error::{Error, PublishError, Result, TransportError};
use crate::orchestrator::UploadOrchestrator;
use crate::types::{MediaRef, MessageId, PublishedMedia, UserId};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tempfile::tempdir;

/// Transport mock: materializes media as small files in a temp directory and
/// records every message sent
pub(crate) struct MockTransport {
    media_dir: PathBuf,
    next_message: AtomicI64,
    next_file: AtomicI64,
    pub(crate) fail_downloads: AtomicBool,
    /// Number of upcoming `send` calls answered with a rate-limit fault
    pub(crate) rate_limited_sends: AtomicI64,
    pub(crate) send_attempts: AtomicI64,
    pub(crate) sent: Mutex<Vec<(UserId, String)>>,
    pub(crate) edits: Mutex<Vec<(UserId, MessageId, String)>>,
}

impl MockTransport {
    pub(crate) fn new(media_dir: PathBuf) -> Self {
        Self {
            media_dir,
            next_message: AtomicI64::new(1),
            next_file: AtomicI64::new(1),
            fail_downloads: AtomicBool::new(false),
            rate_limited_sends: AtomicI64::new(0),
            send_attempts: AtomicI64::new(0),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
        }
    }

    /// All message texts sent to the user, in order
    pub(crate) fn messages_for(&self, user: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == user)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Number of media files currently on disk
    pub(crate) fn files_on_disk(&self) -> usize {
        std::fs::read_dir(&self.media_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn download(&self, _media: &MediaRef) -> Result<PathBuf> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(Error::Transport(TransportError::Failed(
                "download failed".to_string(),
            )));
        }
        let n = self.next_file.fetch_add(1, Ordering::SeqCst);
        let path = self.media_dir.join(format!("media_{}.bin", n));
        tokio::fs::write(&path, b"test media bytes").await?;
        Ok(path)
    }

    async fn send(&self, user: UserId, text: &str) -> Result<MessageId> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.rate_limited_sends.load(Ordering::SeqCst) > 0 {
            self.rate_limited_sends.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Transport(TransportError::RateLimited(
                "too many requests".to_string(),
            )));
        }
        self.sent.lock().unwrap().push((user, text.to_string()));
        Ok(MessageId(self.next_message.fetch_add(1, Ordering::SeqCst)))
    }

    async fn edit(&self, user: UserId, message: MessageId, text: &str) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((user, message, text.to_string()));
        Ok(())
    }
}

/// Publish mock: records requests and can be primed to fail the next publish
pub(crate) struct MockPublisher {
    next_media: AtomicI64,
    pub(crate) fail_next: Mutex<Option<PublishError>>,
    pub(crate) published: Mutex<Vec<PublishRequest>>,
    pub(crate) comments: Mutex<Vec<(String, String)>>,
}

impl MockPublisher {
    pub(crate) fn new() -> Self {
        Self {
            next_media: AtomicI64::new(1),
            fail_next: Mutex::new(None),
            published: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_next_with(&self, error: PublishError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl PublishClient for MockPublisher {
    async fn publish(
        &self,
        _user: UserId,
        request: PublishRequest,
    ) -> std::result::Result<PublishedMedia, PublishError> {
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        let n = self.next_media.fetch_add(1, Ordering::SeqCst);
        self.published.lock().unwrap().push(request);
        Ok(PublishedMedia {
            media_id: format!("media-{}", n),
            url: format!("https://example.com/p/{}", n),
        })
    }

    async fn comment(
        &self,
        _user: UserId,
        media_id: &str,
        text: &str,
    ) -> std::result::Result<(), PublishError> {
        self.comments
            .lock()
            .unwrap()
            .push((media_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Transform mock: copies the input to a sibling `.out` file when active
pub(crate) struct MockTransform {
    pub(crate) active: AtomicBool,
    pub(crate) transformed: Mutex<Vec<PathBuf>>,
}

impl MockTransform {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            transformed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaTransform for MockTransform {
    fn needs_transform(&self, _path: &Path) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn transform(&self, path: &Path, _settings: &TransformSettings) -> Result<PathBuf> {
        let out = path.with_extension("out");
        tokio::fs::copy(path, &out).await?;
        self.transformed.lock().unwrap().push(out.clone());
        Ok(out)
    }
}

/// Everything a test needs: the orchestrator, its mocks, and the tempdir
/// that must be kept alive for the duration of the test
pub(crate) struct TestHarness {
    pub(crate) orchestrator: UploadOrchestrator,
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) publisher: Arc<MockPublisher>,
    pub(crate) transform: Arc<MockTransform>,
    #[allow(dead_code)]
    temp_dir: tempfile::TempDir,
}

/// Create an orchestrator wired to mock collaborators
pub(crate) async fn create_test_orchestrator() -> TestHarness {
    create_test_orchestrator_with(|_| {}).await
}

/// Create an orchestrator with a config tweak applied before construction
pub(crate) async fn create_test_orchestrator_with(
    tweak: impl FnOnce(&mut Config),
) -> TestHarness {
    let temp_dir = tempdir().unwrap();
    let media_dir = temp_dir.path().join("media");
    std::fs::create_dir_all(&media_dir).unwrap();

    let mut config = Config {
        database_path: temp_dir.path().join("test.db"),
        temp_dir: temp_dir.path().join("temp"),
        max_concurrent_uploads: 3,
        ..Config::default()
    };
    tweak(&mut config);

    let transport = Arc::new(MockTransport::new(media_dir));
    let publisher = Arc::new(MockPublisher::new());
    let transform = Arc::new(MockTransform::new());

    // sqlx opens sqlite connections on a dedicated thread tokio cannot see;
    // under `start_paused` the runtime auto-advances past the pool's acquire
    // timeout while waiting on it. A live `spawn_blocking` task inhibits
    // auto-advance, so keep one running for the duration of setup.
    let (setup_done_tx, setup_done_rx) = std::sync::mpsc::channel::<()>();
    let auto_advance_inhibitor = tokio::task::spawn_blocking(move || {
        let _ = setup_done_rx.recv();
    });

    let orchestrator = UploadOrchestrator::new(
        config,
        transport.clone(),
        publisher.clone(),
        transform.clone(),
    )
    .await
    .unwrap();

    // Pre-open every pool connection while auto-advance is still inhibited,
    // so no test ever has to establish one under a paused clock.
    let mut warm = Vec::new();
    for _ in 0..orchestrator.db.pool().options().get_max_connections() {
        warm.push(orchestrator.db.pool().acquire().await.unwrap());
    }
    drop(warm);

    let _ = setup_done_tx.send(());
    let _ = auto_advance_inhibitor.await;

    TestHarness {
        orchestrator,
        transport,
        publisher,
        transform,
        temp_dir,
    }
}
