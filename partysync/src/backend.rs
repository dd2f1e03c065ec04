//! The playlist backend seam.
//!
//! The backend owns parties and playlists. `partygql` implements this trait
//! over GraphQL; [`crate::memory_backend::MemoryBackend`] implements it in
//! process for tests and demos.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::anchor::PlaybackAnchor;
use crate::errors::Result;
use crate::model::{JoinedParty, Playlist, PlaylistId, TrackId, UserId};

/// Push stream of full playlist snapshots.
///
/// The stream ends when the backend drops the subscription.
pub type SnapshotStream = BoxStream<'static, Playlist>;

#[async_trait]
pub trait PlaylistBackend: Send + Sync {
    /// Creates a party seeded with the video at `url`.
    async fn start_party(&self, url: &str) -> Result<Playlist>;

    async fn join_party(&self, playlist_id: &PlaylistId) -> Result<JoinedParty>;

    async fn leave_party(&self, playlist_id: &PlaylistId, user_id: &UserId) -> Result<()>;

    async fn playlist(&self, playlist_id: &PlaylistId) -> Result<Playlist>;

    /// Opens a `PlaylistUpdated` subscription.
    ///
    /// Resolves once the subscription is established on the backend side.
    async fn subscribe_playlist(&self, playlist_id: &PlaylistId) -> Result<SnapshotStream>;

    /// Publishes a new playback anchor for the current track.
    async fn update_playlist(&self, playlist_id: &PlaylistId, anchor: PlaybackAnchor) -> Result<()>;

    async fn add_track(
        &self,
        playlist_id: &PlaylistId,
        url: &str,
        name: Option<&str>,
        user_id: &UserId,
    ) -> Result<()>;

    async fn remove_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> Result<()>;

    async fn vote(&self, track_id: &TrackId, user_id: &UserId) -> Result<()>;

    async fn remove_vote(&self, track_id: &TrackId, user_id: &UserId) -> Result<()>;
}
