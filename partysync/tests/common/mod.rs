#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use partysync::{
    CoordinatorDeps, CoordinatorSettings, JoinedParty, MemoryBackend, MemoryPartyStore,
    MemoryTabHost, PartyCoordinator, PlaybackAnchor, Playlist, PlaylistBackend, PlaylistId,
    PlaylistSubscriptionChannel, SnapshotChannel, SnapshotHandler, SnapshotStream,
    SubscriptionHandle, SyncError, TrackId, UserId,
};
use tokio::sync::{Notify, Semaphore};

pub const SITE: &str = "youtube";
pub const HOME: &str = "https://www.youtube.com/";
pub const VIDEO_A: &str = "https://www.youtube.com/watch?v=AAAA";
pub const VIDEO_B: &str = "https://www.youtube.com/watch?v=BBBB";
pub const LOCAL_USER: &str = "local-user";

/// Memory backend whose joins and starts can be held until the test
/// releases them.
pub struct GatedBackend {
    pub inner: MemoryBackend,
    gate_joins: AtomicBool,
    gate: Semaphore,
    join_started: Notify,
    gate_starts: AtomicBool,
    start_gate: Semaphore,
    start_started: Notify,
}

impl GatedBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            gate_joins: AtomicBool::new(false),
            gate: Semaphore::new(0),
            join_started: Notify::new(),
            gate_starts: AtomicBool::new(false),
            start_gate: Semaphore::new(0),
            start_started: Notify::new(),
        }
    }

    pub fn hold_joins(&self) {
        self.gate_joins.store(true, Ordering::SeqCst);
    }

    pub fn release_joins(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn hold_starts(&self) {
        self.gate_starts.store(true, Ordering::SeqCst);
    }

    pub fn release_starts(&self, count: usize) {
        self.start_gate.add_permits(count);
    }

    pub async fn start_reached(&self) {
        tokio::time::timeout(Duration::from_secs(2), self.start_started.notified())
            .await
            .expect("no start reached the backend");
    }

    /// Waits until a join reached the backend.
    pub async fn join_reached(&self) {
        tokio::time::timeout(Duration::from_secs(2), self.join_started.notified())
            .await
            .expect("no join reached the backend");
    }
}

#[async_trait]
impl PlaylistBackend for GatedBackend {
    async fn start_party(&self, url: &str) -> partysync::Result<Playlist> {
        self.start_started.notify_one();
        if self.gate_starts.load(Ordering::SeqCst) {
            let permit = self.start_gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        self.inner.start_party(url).await
    }

    async fn join_party(&self, playlist_id: &PlaylistId) -> partysync::Result<JoinedParty> {
        self.join_started.notify_one();
        if self.gate_joins.load(Ordering::SeqCst) {
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
        }
        self.inner.join_party(playlist_id).await
    }

    async fn leave_party(&self, playlist_id: &PlaylistId, user_id: &UserId) -> partysync::Result<()> {
        self.inner.leave_party(playlist_id, user_id).await
    }

    async fn playlist(&self, playlist_id: &PlaylistId) -> partysync::Result<Playlist> {
        self.inner.playlist(playlist_id).await
    }

    async fn subscribe_playlist(&self, playlist_id: &PlaylistId) -> partysync::Result<SnapshotStream> {
        self.inner.subscribe_playlist(playlist_id).await
    }

    async fn update_playlist(&self, playlist_id: &PlaylistId, anchor: PlaybackAnchor) -> partysync::Result<()> {
        self.inner.update_playlist(playlist_id, anchor).await
    }

    async fn add_track(
        &self,
        playlist_id: &PlaylistId,
        url: &str,
        name: Option<&str>,
        user_id: &UserId,
    ) -> partysync::Result<()> {
        self.inner.add_track(playlist_id, url, name, user_id).await
    }

    async fn remove_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> partysync::Result<()> {
        self.inner.remove_track(playlist_id, track_id).await
    }

    async fn vote(&self, track_id: &TrackId, user_id: &UserId) -> partysync::Result<()> {
        self.inner.vote(track_id, user_id).await
    }

    async fn remove_vote(&self, track_id: &TrackId, user_id: &UserId) -> partysync::Result<()> {
        self.inner.remove_vote(track_id, user_id).await
    }
}

/// Counts opened and closed subscriptions.
pub struct RecordingChannel {
    inner: PlaylistSubscriptionChannel,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    fail_opens: AtomicBool,
}

impl RecordingChannel {
    pub fn new(backend: Arc<dyn PlaylistBackend>) -> Self {
        Self {
            inner: PlaylistSubscriptionChannel::new(backend),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_opens: AtomicBool::new(false),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotChannel for RecordingChannel {
    async fn open(
        &self,
        playlist_id: &PlaylistId,
        on_snapshot: SnapshotHandler,
    ) -> partysync::Result<SubscriptionHandle> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(SyncError::Subscription(playlist_id.clone(), "refused".into()));
        }
        let handle = self.inner.open(playlist_id, on_snapshot).await?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        let closed = self.closed.clone();
        handle.on_close(move || {
            closed.fetch_add(1, Ordering::SeqCst);
        });
        Ok(handle)
    }
}

pub struct Harness {
    pub memory: MemoryBackend,
    pub backend: Arc<GatedBackend>,
    pub channel: Arc<RecordingChannel>,
    pub host: Arc<MemoryTabHost>,
    pub store: Arc<MemoryPartyStore>,
    pub coordinator: PartyCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryPartyStore::new())
    }

    pub fn with_store(store: MemoryPartyStore) -> Self {
        let memory = MemoryBackend::new();
        let backend = Arc::new(GatedBackend::new(memory.clone()));
        let channel = Arc::new(RecordingChannel::new(backend.clone()));
        let host = Arc::new(MemoryTabHost::new());
        let store = Arc::new(store);

        let deps = CoordinatorDeps::new(
            backend.clone(),
            host.clone(),
            store.clone(),
            CoordinatorSettings::new(SITE, LOCAL_USER),
        )
        .with_channel(channel.clone());
        let coordinator = PartyCoordinator::spawn(deps);

        Self {
            memory,
            backend,
            channel,
            host,
            store,
            coordinator,
        }
    }

    /// A party created by someone else, seeded with [`VIDEO_A`].
    pub async fn remote_party(&self) -> Playlist {
        self.memory.start_party(VIDEO_A).await.unwrap()
    }
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn eventually_async<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
