use std::sync::Arc;

use tracing::{debug, trace};

use crate::anchor::{Clock, PlaybackAnchor};
use crate::model::Playlist;

use super::media::MediaElement;

/// Moves a guest's media to the admin's extrapolated position.
///
/// A new anchor is applied as soon as its snapshot arrives, then once more
/// on the next `playing` event (the first correction is usually off by the
/// time the video took to load). Further `playing` events and repeated
/// deliveries of the same anchor change nothing.
pub struct PlaybackClockReconciler {
    is_admin: bool,
    clock: Arc<dyn Clock>,
    anchor: Option<PlaybackAnchor>,
    correct_on_play: bool,
}

impl PlaybackClockReconciler {
    pub fn new(is_admin: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            is_admin,
            clock,
            anchor: None,
            correct_on_play: false,
        }
    }

    pub fn anchor(&self) -> Option<PlaybackAnchor> {
        self.anchor
    }

    /// Returns the position applied, if any.
    pub fn on_snapshot(&mut self, playlist: &Playlist, media: Option<&dyn MediaElement>) -> Option<f64> {
        if self.is_admin {
            return None;
        }
        let anchor = PlaybackAnchor::from_playlist(playlist)?;
        if self.anchor == Some(anchor) {
            trace!(playlist = %playlist.id, "Anchor unchanged");
            return None;
        }

        self.anchor = Some(anchor);
        self.correct_on_play = true;
        self.apply(media)
    }

    pub fn on_playing(&mut self, media: Option<&dyn MediaElement>) -> Option<f64> {
        if self.is_admin || !self.correct_on_play || self.anchor.is_none() {
            return None;
        }
        let applied = self.apply(media);
        if applied.is_some() {
            self.correct_on_play = false;
        }
        applied
    }

    fn apply(&self, media: Option<&dyn MediaElement>) -> Option<f64> {
        let anchor = self.anchor?;
        let media = media?;
        let target = anchor.position_at(self.clock.now_ms());
        media.set_current_time(target);
        debug!(target, "Guest position corrected");
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::ManualClock;
    use crate::playback::media::MemoryMedia;

    const T: i64 = 1_700_000_000_000;

    fn anchored(started_at: i64, second: f64) -> Playlist {
        let mut playlist = Playlist::new("p1", "");
        playlist.current_song_started_timestamp = Some(started_at);
        playlist.current_song_playback_second = Some(second);
        playlist
    }

    #[test]
    fn test_guest_follows_anchor() {
        let clock = Arc::new(ManualClock::new(T + 5_000));
        let media = MemoryMedia::new(0.0);
        let mut reconciler = PlaybackClockReconciler::new(false, clock);

        let applied = reconciler.on_snapshot(&anchored(T, 30.0), Some(&media));
        assert!((applied.unwrap() - 35.0).abs() < 1e-6);
        assert!((media.current_time() - 35.0).abs() < 1e-6);
    }

    #[test]
    fn test_playing_corrects_once_per_anchor() {
        let clock = Arc::new(ManualClock::new(T));
        let media = MemoryMedia::new(0.0);
        let mut reconciler = PlaybackClockReconciler::new(false, clock.clone());

        reconciler.on_snapshot(&anchored(T, 10.0), Some(&media));
        clock.advance(2_000);
        assert_eq!(reconciler.on_playing(Some(&media)), Some(12.0));
        assert_eq!(reconciler.on_playing(Some(&media)), None);

        // repeated delivery of the same anchor is ignored
        assert_eq!(reconciler.on_snapshot(&anchored(T, 10.0), Some(&media)), None);
        assert_eq!(reconciler.on_playing(Some(&media)), None);

        // a new anchor re-arms the correction
        assert_eq!(reconciler.on_snapshot(&anchored(T + 2_000, 50.0), Some(&media)), Some(50.0));
        assert_eq!(reconciler.on_playing(Some(&media)), Some(50.0));
        assert_eq!(media.applied(), vec![10.0, 12.0, 50.0, 50.0]);
    }

    #[test]
    fn test_admin_position_is_never_changed() {
        let clock = Arc::new(ManualClock::new(T + 5_000));
        let media = MemoryMedia::new(3.0);
        let mut reconciler = PlaybackClockReconciler::new(true, clock);

        assert_eq!(reconciler.on_snapshot(&anchored(T, 30.0), Some(&media)), None);
        assert_eq!(reconciler.on_playing(Some(&media)), None);
        assert_eq!(media.current_time(), 3.0);
        assert!(media.applied().is_empty());
    }

    #[test]
    fn test_no_anchor_or_no_media_is_a_no_op() {
        let clock = Arc::new(ManualClock::new(T));
        let media = MemoryMedia::new(0.0);
        let mut reconciler = PlaybackClockReconciler::new(false, clock);

        assert_eq!(reconciler.on_snapshot(&Playlist::new("p1", ""), Some(&media)), None);
        assert_eq!(reconciler.on_playing(Some(&media)), None);

        assert_eq!(reconciler.on_snapshot(&anchored(T, 4.0), None), None);
        // the anchor is kept for when the media shows up
        assert_eq!(reconciler.on_playing(Some(&media)), Some(4.0));
    }
}
