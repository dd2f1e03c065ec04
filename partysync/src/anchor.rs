//! Playback clock anchors.
//!
//! An anchor is the pair (wall-clock timestamp, playback offset) published by
//! the admin. Anyone holding it can extrapolate the admin's position without
//! polling: `position = offset + (now - timestamp) / 1000`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::model::Playlist;

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock driven by hand, for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackAnchor {
    /// Wall-clock time of the anchor, in milliseconds since the epoch.
    pub started_at_ms: i64,
    /// Playback second of the current track at `started_at_ms`.
    pub playback_second: f64,
}

impl PlaybackAnchor {
    /// Captures the anchor the admin publishes after a seek.
    ///
    /// The offset is truncated to whole seconds.
    pub fn capture(now_ms: i64, position_secs: f64) -> Self {
        Self {
            started_at_ms: now_ms,
            playback_second: position_secs.max(0.0).floor(),
        }
    }

    /// Reads the anchor carried by a snapshot.
    ///
    /// Both fields must be present; a half-written anchor is ignored.
    pub fn from_playlist(playlist: &Playlist) -> Option<Self> {
        match (
            playlist.current_song_started_timestamp,
            playlist.current_song_playback_second,
        ) {
            (Some(started_at_ms), Some(playback_second)) if playback_second.is_finite() => {
                Some(Self {
                    started_at_ms,
                    playback_second,
                })
            }
            _ => None,
        }
    }

    /// Extrapolated position at `now_ms`, never negative.
    pub fn position_at(&self, now_ms: i64) -> f64 {
        let elapsed = (now_ms - self.started_at_ms) as f64 / 1000.0;
        (self.playback_second + elapsed).max(0.0)
    }
}
