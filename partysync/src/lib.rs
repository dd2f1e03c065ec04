//! # partysync
//!
//! Client-side synchronization of watch parties: a group of viewers watching
//! the same video playlist, each in their own browser, following one admin.
//!
//! Two independent parts:
//!
//! - **Membership** ([`PartyCoordinator`]): binds one tab per browser to the
//!   active party, handles start / join / leave, keeps the tab on the
//!   party's current track as the playlist advances.
//! - **Playback** ([`playback`]): the admin publishes a playback anchor
//!   (timestamp, offset) on every seek; guests extrapolate the admin's
//!   position from it and correct their own player.
//!
//! Every external system sits behind a trait with an in-memory
//! implementation: [`PlaylistBackend`] ([`MemoryBackend`]), [`TabHost`]
//! ([`MemoryTabHost`]), [`PartyStore`] ([`MemoryPartyStore`],
//! [`FilePartyStore`]) and [`playback::MediaPage`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use partysync::{
//!     CoordinatorDeps, CoordinatorSettings, MemoryBackend, MemoryPartyStore, MemoryTabHost,
//!     PartyCoordinator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> partysync::Result<()> {
//! let host = Arc::new(MemoryTabHost::new());
//! let tab = host.open_tab("https://www.youtube.com/watch?v=dQw4w9WgXcQ", true);
//!
//! let coordinator = PartyCoordinator::spawn(CoordinatorDeps::new(
//!     Arc::new(MemoryBackend::new()),
//!     host.clone(),
//!     Arc::new(MemoryPartyStore::new()),
//!     CoordinatorSettings::new("youtube", "me"),
//! ));
//! let _events = coordinator.attach(&host.events());
//!
//! let playlist_id = coordinator
//!     .start_party("https://www.youtube.com/watch?v=dQw4w9WgXcQ", tab)
//!     .await?;
//! println!("party {playlist_id} started");
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod anchor;
pub mod backend;
pub mod channel;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod host;
pub mod logs;
pub mod memory_backend;
pub mod messages;
pub mod model;
pub mod navigator;
pub mod playback;
pub mod store;

#[cfg(feature = "partyconfig")]
pub mod config_ext;

pub use actions::{PlaylistActions, TrackCandidate, TrackPicker};
pub use anchor::{Clock, ManualClock, PlaybackAnchor, SystemClock};
pub use backend::{PlaylistBackend, SnapshotStream};
pub use channel::{PlaylistSubscriptionChannel, SnapshotChannel, SnapshotHandler, SubscriptionHandle};
pub use coordinator::{
    Binding, CoordinatorDeps, CoordinatorSettings, JoinOutcome, LeaveOutcome, PartyCoordinator,
};
pub use errors::{Result, SyncError};
pub use events::{EventSource, UnsubscribeToken};
pub use host::{HostEvent, MemoryTabHost, TabHost, TabId, TabInfo};
pub use memory_backend::MemoryBackend;
pub use messages::PartyMessage;
pub use model::{JoinedParty, Party, Playlist, PlaylistId, Track, TrackId, User, UserId, Vote};
pub use navigator::{NavigationDecision, NavigationSkip, TabNavigator};
pub use store::{FilePartyStore, MemoryPartyStore, PartyStore};

#[cfg(feature = "partyconfig")]
pub use config_ext::PartySyncConfigExt;
