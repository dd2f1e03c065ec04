use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::anchor::Clock;
use crate::backend::PlaylistBackend;
use crate::errors::Result;
use crate::model::Party;

use super::broadcaster::AdminPlaybackBroadcaster;
use super::media::{MediaElement, MediaEvent, MediaPage};
use super::reconciler::PlaybackClockReconciler;

/// Runs playback synchronization on a party page.
///
/// The admin side publishes an anchor on every seek; the guest side follows
/// the anchors of the playlist snapshots. Works directly against the
/// backend, independently of the coordinator.
pub struct PlaybackSync {
    backend: Arc<dyn PlaylistBackend>,
    clock: Arc<dyn Clock>,
}

impl PlaybackSync {
    pub fn new(backend: Arc<dyn PlaylistBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Returns when `cancel` fires, when the media element goes away, or
    /// immediately if the page has no media.
    pub async fn run(&self, party: &Party, page: &dyn MediaPage, cancel: CancellationToken) -> Result<()> {
        let Some(media) = page.media() else {
            debug!(playlist = %party.playlist_id, "No media on page, nothing to synchronize");
            return Ok(());
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let token = media.events().subscribe(move |event: &MediaEvent| {
            let _ = tx.send(*event);
        });

        let result = match AdminPlaybackBroadcaster::for_party(party, self.backend.clone(), self.clock.clone()) {
            Some(broadcaster) => Self::run_admin(&broadcaster, media.as_ref(), rx, &cancel).await,
            None => self.run_guest(party, media.as_ref(), rx, &cancel).await,
        };

        token.unsubscribe();
        info!(playlist = %party.playlist_id, admin = party.is_admin, "Playback sync stopped");
        result
    }

    async fn run_admin(
        broadcaster: &AdminPlaybackBroadcaster,
        media: &dyn MediaElement,
        mut events: mpsc::UnboundedReceiver<MediaEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = events.recv() => match event {
                    Some(MediaEvent::Seeked) => {
                        // a failed publish is logged; the next seek retries
                        let _ = broadcaster.on_seeked(media.current_time()).await;
                    }
                    Some(MediaEvent::Playing) => {}
                    None => return Ok(()),
                },
            }
        }
    }

    async fn run_guest(
        &self,
        party: &Party,
        media: &dyn MediaElement,
        mut events: mpsc::UnboundedReceiver<MediaEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut reconciler = PlaybackClockReconciler::new(false, self.clock.clone());

        let initial = self.backend.playlist(&party.playlist_id).await?;
        reconciler.on_snapshot(&initial, Some(media));

        let mut snapshots = self.backend.subscribe_playlist(&party.playlist_id).await?;
        let mut subscribed = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = events.recv() => match event {
                    Some(MediaEvent::Playing) => {
                        reconciler.on_playing(Some(media));
                    }
                    Some(MediaEvent::Seeked) => {}
                    None => return Ok(()),
                },
                snapshot = snapshots.next(), if subscribed => match snapshot {
                    Some(playlist) => {
                        reconciler.on_snapshot(&playlist, Some(media));
                    }
                    None => {
                        debug!(playlist = %party.playlist_id, "Playlist subscription ended");
                        subscribed = false;
                    }
                },
            }
        }
    }
}
