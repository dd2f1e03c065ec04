//! Playlist subscription channel.
//!
//! `open` turns a backend `PlaylistUpdated` subscription into callbacks on a
//! single handler and returns a [`SubscriptionHandle`]; closing the handle
//! (explicitly or by dropping it) stops delivery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::PlaylistBackend;
use crate::errors::Result;
use crate::model::{Playlist, PlaylistId};

/// Receives every snapshot of a subscription, in delivery order.
///
/// Snapshots may repeat; handlers must be idempotent.
pub type SnapshotHandler = Arc<dyn Fn(Playlist) + Send + Sync>;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

type CloseHook = Box<dyn FnOnce() + Send>;

/// An open subscription. Closing is idempotent and happens at most once.
pub struct SubscriptionHandle {
    id: u64,
    playlist_id: PlaylistId,
    cancel: CancellationToken,
    closed: AtomicBool,
    hooks: Mutex<Vec<CloseHook>>,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("playlist_id", &self.playlist_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SubscriptionHandle {
    pub fn new(playlist_id: PlaylistId) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            playlist_id,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn playlist_id(&self) -> &PlaylistId {
        &self.playlist_id
    }

    /// Cancelled when the handle is closed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `hook` on close. Runs it immediately if already closed.
    pub fn on_close<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            hook();
            return;
        }
        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    /// Stops delivery. Returns `true` for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        // also reached from Drop: a poisoned lock must not panic while unwinding
        let hooks = std::mem::take(
            &mut *self
                .hooks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for hook in hooks {
            hook();
        }
        debug!(playlist = %self.playlist_id, handle = self.id, "Subscription closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
pub trait SnapshotChannel: Send + Sync {
    /// Subscribes to `playlist_id`; resolves once the subscription is live.
    async fn open(
        &self,
        playlist_id: &PlaylistId,
        on_snapshot: SnapshotHandler,
    ) -> Result<SubscriptionHandle>;
}

/// [`SnapshotChannel`] over [`PlaylistBackend::subscribe_playlist`].
///
/// One forwarding task per handle; it ends when the handle is closed or the
/// backend stream ends.
pub struct PlaylistSubscriptionChannel {
    backend: Arc<dyn PlaylistBackend>,
}

impl PlaylistSubscriptionChannel {
    pub fn new(backend: Arc<dyn PlaylistBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SnapshotChannel for PlaylistSubscriptionChannel {
    async fn open(
        &self,
        playlist_id: &PlaylistId,
        on_snapshot: SnapshotHandler,
    ) -> Result<SubscriptionHandle> {
        let mut stream = self.backend.subscribe_playlist(playlist_id).await?;
        let handle = SubscriptionHandle::new(playlist_id.clone());
        let cancel = handle.cancellation_token();
        let id = playlist_id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = stream.next() => match next {
                        Some(snapshot) => on_snapshot(snapshot),
                        None => {
                            info!(playlist = %id, "Playlist subscription ended by backend");
                            break;
                        }
                    },
                }
            }
            debug!(playlist = %id, "Subscription task finished");
        });

        info!(playlist = %playlist_id, handle = handle.id(), "Subscribed to playlist updates");
        Ok(handle)
    }
}
