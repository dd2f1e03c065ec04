//! In-process [`PlaylistBackend`], used by tests, demos and offline runs.
//!
//! Each playlist owns a `broadcast` channel; every mutation publishes the
//! full updated snapshot to the open subscriptions, like the GraphQL
//! `PlaylistUpdated` subscription does.
//!
//! ```
//! use partysync::{MemoryBackend, PlaylistBackend};
//!
//! # tokio_test::block_on(async {
//! let backend = MemoryBackend::new();
//! let playlist = backend
//!     .start_party("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
//!     .await
//!     .unwrap();
//! assert_eq!(playlist.current_index, Some(0));
//! assert!(playlist.url.contains("playlistPartyId="));
//!
//! let next = backend.advance(&playlist.id).unwrap();
//! assert_eq!(next.current_index, Some(0));
//! # });
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::anchor::{Clock, PlaybackAnchor, SystemClock};
use crate::backend::{PlaylistBackend, SnapshotStream};
use crate::errors::{Result, SyncError};
use crate::model::{JoinedParty, Playlist, PlaylistId, Track, TrackId, User, UserId, Vote};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Query parameter carrying the party id in invitation links.
pub const PARTY_ID_PARAM: &str = "playlistPartyId";

struct PlaylistEntry {
    playlist: Playlist,
    tx: broadcast::Sender<Playlist>,
}

struct BackendInner {
    playlists: Mutex<HashMap<PlaylistId, PlaylistEntry>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: AtomicBool,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<BackendInner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(BackendInner {
                playlists: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                failing: AtomicBool::new(false),
                clock,
            }),
        }
    }

    /// Number of times the backend operation `name` was invoked.
    pub fn calls(&self, name: &str) -> usize {
        self.inner
            .calls
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Makes every subsequent operation fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Inserts (or replaces) a playlist and notifies its subscribers.
    pub fn publish(&self, playlist: Playlist) {
        let mut playlists = self.inner.playlists.lock().unwrap();
        let entry = playlists
            .entry(playlist.id.clone())
            .or_insert_with(|| PlaylistEntry {
                playlist: playlist.clone(),
                tx: broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY).0,
            });
        entry.playlist = playlist;
        let _ = entry.tx.send(entry.playlist.clone());
    }

    /// Moves the party to the next track, as the server does when a video ends.
    pub fn advance(&self, playlist_id: &PlaylistId) -> Result<Playlist> {
        self.mutate(playlist_id, |playlist| {
            let next = playlist.current_index.map_or(0, |i| i + 1);
            if next < playlist.tracks.len() {
                playlist.current_index = Some(next);
                playlist.current_song_started_timestamp = None;
                playlist.current_song_playback_second = None;
            }
            Ok(())
        })
    }

    /// Current number of open subscriptions on a playlist.
    pub fn subscriber_count(&self, playlist_id: &PlaylistId) -> usize {
        self.inner
            .playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .map(|entry| entry.tx.receiver_count())
            .unwrap_or(0)
    }

    fn record(&self, name: &'static str) -> Result<()> {
        *self.inner.calls.lock().unwrap().entry(name).or_insert(0) += 1;
        if self.inner.failing.load(Ordering::SeqCst) {
            warn!(operation = name, "Memory backend configured to fail");
            return Err(SyncError::backend(format!("{name} failed")));
        }
        Ok(())
    }

    fn mutate<F>(&self, playlist_id: &PlaylistId, f: F) -> Result<Playlist>
    where
        F: FnOnce(&mut Playlist) -> Result<()>,
    {
        let mut playlists = self.inner.playlists.lock().unwrap();
        let entry = playlists
            .get_mut(playlist_id)
            .ok_or_else(|| SyncError::backend(format!("Unknown playlist {playlist_id}")))?;
        f(&mut entry.playlist)?;
        let snapshot = entry.playlist.clone();
        let _ = entry.tx.send(snapshot.clone());
        Ok(snapshot)
    }

    fn playlist_of_track(&self, track_id: &TrackId) -> Result<PlaylistId> {
        self.inner
            .playlists
            .lock()
            .unwrap()
            .values()
            .find(|entry| entry.playlist.track(track_id).is_some())
            .map(|entry| entry.playlist.id.clone())
            .ok_or_else(|| SyncError::backend(format!("Unknown track {track_id}")))
    }
}

/// Builds the invitation link of a party from the video it started on.
pub fn invitation_url(url: &str, playlist_id: &PlaylistId) -> Result<String> {
    let mut parsed = Url::parse(url).map_err(|_| SyncError::InvalidTrackUrl(url.to_string()))?;
    parsed
        .query_pairs_mut()
        .append_pair(PARTY_ID_PARAM, playlist_id.as_str());
    Ok(parsed.to_string())
}

#[async_trait]
impl PlaylistBackend for MemoryBackend {
    async fn start_party(&self, url: &str) -> Result<Playlist> {
        self.record("start_party")?;
        let id = PlaylistId::new(Uuid::new_v4().to_string());
        let mut playlist = Playlist::new(id.clone(), invitation_url(url, &id)?);
        playlist.tracks.push(Track {
            id: TrackId::new(Uuid::new_v4().to_string()),
            url: url.to_string(),
            name: None,
            votes: Vec::new(),
        });
        playlist.current_index = Some(0);

        debug!(playlist = %id, url, "Party created");
        self.publish(playlist.clone());
        Ok(playlist)
    }

    async fn join_party(&self, playlist_id: &PlaylistId) -> Result<JoinedParty> {
        self.record("join_party")?;
        let user = User::new(Uuid::new_v4().to_string());
        let joined = user.clone();
        let playlist = self.mutate(playlist_id, move |playlist| {
            playlist.users.push(joined);
            Ok(())
        })?;
        debug!(playlist = %playlist_id, user = %user.id, "User joined");
        Ok(JoinedParty {
            playlist,
            user,
            admin: false,
        })
    }

    async fn leave_party(&self, playlist_id: &PlaylistId, user_id: &UserId) -> Result<()> {
        self.record("leave_party")?;
        self.mutate(playlist_id, |playlist| {
            playlist.users.retain(|user| &user.id != user_id);
            Ok(())
        })?;
        Ok(())
    }

    async fn playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist> {
        self.record("playlist")?;
        self.inner
            .playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .map(|entry| entry.playlist.clone())
            .ok_or_else(|| SyncError::backend(format!("Unknown playlist {playlist_id}")))
    }

    async fn subscribe_playlist(&self, playlist_id: &PlaylistId) -> Result<SnapshotStream> {
        self.record("subscribe_playlist")?;
        let rx = self
            .inner
            .playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .map(|entry| entry.tx.subscribe())
            .ok_or_else(|| SyncError::Subscription(playlist_id.clone(), "unknown playlist".into()))?;

        // Lagged receivers skip the missed snapshots: the next one is complete.
        let stream = BroadcastStream::new(rx).filter_map(|item| async move { item.ok() });
        Ok(stream.boxed())
    }

    async fn update_playlist(&self, playlist_id: &PlaylistId, anchor: PlaybackAnchor) -> Result<()> {
        self.record("update_playlist")?;
        self.mutate(playlist_id, |playlist| {
            playlist.current_song_started_timestamp = Some(anchor.started_at_ms);
            playlist.current_song_playback_second = Some(anchor.playback_second);
            Ok(())
        })?;
        Ok(())
    }

    async fn add_track(
        &self,
        playlist_id: &PlaylistId,
        url: &str,
        name: Option<&str>,
        _user_id: &UserId,
    ) -> Result<()> {
        self.record("add_track")?;
        let track = Track {
            id: TrackId::new(Uuid::new_v4().to_string()),
            url: url.to_string(),
            name: name.map(str::to_string),
            votes: Vec::new(),
        };
        self.mutate(playlist_id, move |playlist| {
            playlist.tracks.push(track);
            if playlist.current_index.is_none() {
                playlist.current_index = Some(0);
            }
            Ok(())
        })?;
        Ok(())
    }

    async fn remove_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> Result<()> {
        self.record("remove_track")?;
        self.mutate(playlist_id, |playlist| {
            let position = playlist
                .tracks
                .iter()
                .position(|track| &track.id == track_id)
                .ok_or_else(|| SyncError::backend(format!("Unknown track {track_id}")))?;
            playlist.tracks.remove(position);

            let current = playlist.current_index;
            playlist.current_index = match current {
                _ if playlist.tracks.is_empty() => None,
                Some(i) if position < i => Some(i - 1),
                Some(i) => Some(i.min(playlist.tracks.len() - 1)),
                None => None,
            };
            Ok(())
        })?;
        Ok(())
    }

    async fn vote(&self, track_id: &TrackId, user_id: &UserId) -> Result<()> {
        self.record("vote")?;
        let playlist_id = self.playlist_of_track(track_id)?;
        let timestamp = self.inner.clock.now_ms();
        self.mutate(&playlist_id, |playlist| {
            if let Some(track) = playlist.tracks.iter_mut().find(|t| &t.id == track_id) {
                if !track.has_vote_from(user_id) {
                    track.votes.push(Vote {
                        user: User::new(user_id.clone()),
                        timestamp,
                    });
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    async fn remove_vote(&self, track_id: &TrackId, user_id: &UserId) -> Result<()> {
        self.record("remove_vote")?;
        let playlist_id = self.playlist_of_track(track_id)?;
        self.mutate(&playlist_id, |playlist| {
            if let Some(track) = playlist.tracks.iter_mut().find(|t| &t.id == track_id) {
                track.votes.retain(|vote| &vote.user.id != user_id);
            }
            Ok(())
        })?;
        Ok(())
    }
}
