use std::sync::Arc;

use tracing::{debug, warn};

use crate::anchor::{Clock, PlaybackAnchor};
use crate::backend::PlaylistBackend;
use crate::errors::Result;
use crate::model::{Party, PlaylistId};

/// Publishes the admin's playback position as a fresh anchor after every
/// seek.
pub struct AdminPlaybackBroadcaster {
    backend: Arc<dyn PlaylistBackend>,
    clock: Arc<dyn Clock>,
    playlist_id: PlaylistId,
}

impl AdminPlaybackBroadcaster {
    /// `None` unless the local user is the party admin.
    pub fn for_party(
        party: &Party,
        backend: Arc<dyn PlaylistBackend>,
        clock: Arc<dyn Clock>,
    ) -> Option<Self> {
        party.is_admin.then(|| Self {
            backend,
            clock,
            playlist_id: party.playlist_id.clone(),
        })
    }

    /// Publishes `{now, floor(position)}` with UpdatePlaylist.
    pub async fn on_seeked(&self, position_secs: f64) -> Result<PlaybackAnchor> {
        let anchor = PlaybackAnchor::capture(self.clock.now_ms(), position_secs);
        match self.backend.update_playlist(&self.playlist_id, anchor).await {
            Ok(()) => {
                debug!(
                    playlist = %self.playlist_id,
                    started_at = anchor.started_at_ms,
                    second = anchor.playback_second,
                    "Anchor published"
                );
                Ok(anchor)
            }
            Err(e) => {
                warn!(playlist = %self.playlist_id, "Failed to publish anchor: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::ManualClock;
    use crate::memory_backend::MemoryBackend;
    use crate::model::UserId;

    #[tokio::test]
    async fn test_seek_publishes_floored_anchor() {
        let backend = Arc::new(MemoryBackend::new());
        let playlist = backend
            .start_party("https://www.youtube.com/watch?v=a")
            .await
            .unwrap();
        let party = Party {
            playlist_id: playlist.id.clone(),
            user_id: UserId::from("admin"),
            is_admin: true,
        };
        let clock = Arc::new(ManualClock::new(1_000_000));

        let broadcaster = AdminPlaybackBroadcaster::for_party(&party, backend.clone(), clock).unwrap();
        let anchor = broadcaster.on_seeked(73.6).await.unwrap();
        assert_eq!(anchor.playback_second, 73.0);

        let stored = backend.playlist(&playlist.id).await.unwrap();
        assert_eq!(stored.current_song_started_timestamp, Some(1_000_000));
        assert_eq!(stored.current_song_playback_second, Some(73.0));
    }

    #[test]
    fn test_guests_get_no_broadcaster() {
        let party = Party {
            playlist_id: PlaylistId::from("p1"),
            user_id: UserId::from("guest"),
            is_admin: false,
        };
        let broadcaster = AdminPlaybackBroadcaster::for_party(
            &party,
            Arc::new(MemoryBackend::new()),
            Arc::new(ManualClock::new(0)),
        );
        assert!(broadcaster.is_none());
    }
}
