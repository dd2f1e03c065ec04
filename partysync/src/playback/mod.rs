//! Playback clock reconciliation on party pages.
//!
//! The admin's page publishes anchors ([`AdminPlaybackBroadcaster`]); guest
//! pages consume them ([`PlaybackClockReconciler`]). [`PlaybackSync`] wires
//! either side to a page's media element.

pub mod broadcaster;
pub mod media;
pub mod reconciler;
pub mod session;

pub use broadcaster::AdminPlaybackBroadcaster;
pub use media::{MediaElement, MediaEvent, MediaPage, MemoryMedia, MemoryPage};
pub use reconciler::PlaybackClockReconciler;
pub use session::PlaybackSync;
