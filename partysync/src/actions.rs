//! Playlist actions of a party member: adding tracks and voting.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::backend::PlaylistBackend;
use crate::errors::{Result, SyncError};
use crate::events::{EventSource, UnsubscribeToken};
use crate::model::{Party, Playlist, Track, TrackId};

/// A video the user may add to the party, as found on the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackCandidate {
    /// Link to the video, usually relative to the site root.
    pub href: String,
    pub name: Option<String>,
}

pub type TrackChosenHandler = Box<dyn Fn(&TrackCandidate) + Send + Sync>;

/// Finds addable videos on a page and reports the ones the user picks.
pub trait TrackPicker: Send + Sync {
    fn detect_candidate_tracks(&self) -> Vec<TrackCandidate>;

    fn on_track_chosen(&self, handler: TrackChosenHandler) -> UnsubscribeToken;
}

/// Picker with a fixed candidate list; [`choose`](Self::choose) plays the
/// user's click.
#[derive(Clone, Default)]
pub struct MemoryTrackPicker {
    candidates: Vec<TrackCandidate>,
    chosen: EventSource<TrackCandidate>,
}

impl MemoryTrackPicker {
    pub fn new(candidates: Vec<TrackCandidate>) -> Self {
        Self {
            candidates,
            chosen: EventSource::new(),
        }
    }

    pub fn choose(&self, candidate: &TrackCandidate) {
        self.chosen.emit(candidate);
    }
}

impl TrackPicker for MemoryTrackPicker {
    fn detect_candidate_tracks(&self) -> Vec<TrackCandidate> {
        self.candidates.clone()
    }

    fn on_track_chosen(&self, handler: TrackChosenHandler) -> UnsubscribeToken {
        self.chosen.subscribe(move |candidate: &TrackCandidate| handler(candidate))
    }
}

pub struct PlaylistActions {
    backend: Arc<dyn PlaylistBackend>,
    party: Party,
    base_url: Url,
}

impl PlaylistActions {
    pub fn new(backend: Arc<dyn PlaylistBackend>, party: Party, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|_| SyncError::InvalidTrackUrl(base_url.to_string()))?;
        Ok(Self {
            backend,
            party,
            base_url,
        })
    }

    #[cfg(feature = "partyconfig")]
    pub fn from_config(backend: Arc<dyn PlaylistBackend>, party: Party) -> Result<Self> {
        let base_url = partyconfig::get_config().get_site_base_url();
        Self::new(backend, party, &base_url)
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    /// Absolute url of a candidate link; only http(s) urls are accepted.
    pub fn resolve_track_url(&self, href: &str) -> Result<String> {
        let url = self
            .base_url
            .join(href.trim())
            .map_err(|_| SyncError::InvalidTrackUrl(href.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url.to_string()),
            _ => Err(SyncError::InvalidTrackUrl(href.to_string())),
        }
    }

    pub async fn playlist(&self) -> Result<Playlist> {
        self.backend.playlist(&self.party.playlist_id).await
    }

    pub async fn add_track(&self, candidate: &TrackCandidate) -> Result<()> {
        let url = self.resolve_track_url(&candidate.href)?;
        self.backend
            .add_track(
                &self.party.playlist_id,
                &url,
                candidate.name.as_deref(),
                &self.party.user_id,
            )
            .await?;
        info!(playlist = %self.party.playlist_id, url = %url, "Track added");
        Ok(())
    }

    /// Removes a track from the playlist. Admin only.
    pub async fn remove_track(&self, track_id: &TrackId) -> Result<()> {
        if !self.party.is_admin {
            return Err(SyncError::NotAdmin);
        }
        self.backend
            .remove_track(&self.party.playlist_id, track_id)
            .await
    }

    pub async fn vote(&self, track_id: &TrackId) -> Result<()> {
        self.backend.vote(track_id, &self.party.user_id).await
    }

    pub async fn remove_vote(&self, track_id: &TrackId) -> Result<()> {
        self.backend.remove_vote(track_id, &self.party.user_id).await
    }

    /// Votes for `track`, or withdraws the local user's vote if present.
    ///
    /// Returns whether the user votes for the track afterwards.
    pub async fn toggle_vote(&self, track: &Track) -> Result<bool> {
        if track.has_vote_from(&self.party.user_id) {
            self.remove_vote(&track.id).await?;
            Ok(false)
        } else {
            self.vote(&track.id).await?;
            Ok(true)
        }
    }

    /// Submits every track chosen through `picker` with AddTrack.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach_picker(self: &Arc<Self>, picker: &dyn TrackPicker) -> UnsubscribeToken {
        let runtime = tokio::runtime::Handle::current();
        let actions = Arc::clone(self);
        picker.on_track_chosen(Box::new(move |candidate: &TrackCandidate| {
            let actions = actions.clone();
            let candidate = candidate.clone();
            runtime.spawn(async move {
                if let Err(e) = actions.add_track(&candidate).await {
                    warn!(href = %candidate.href, "Failed to add chosen track: {}", e);
                }
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_backend::MemoryBackend;
    use crate::model::{PlaylistId, UserId};

    async fn setup(is_admin: bool) -> (Arc<MemoryBackend>, PlaylistActions, PlaylistId) {
        let backend = Arc::new(MemoryBackend::new());
        let playlist = backend
            .start_party("https://www.youtube.com/watch?v=first")
            .await
            .unwrap();
        let party = Party {
            playlist_id: playlist.id.clone(),
            user_id: UserId::from("u1"),
            is_admin,
        };
        let actions = PlaylistActions::new(backend.clone(), party, "https://www.youtube.com").unwrap();
        (backend, actions, playlist.id)
    }

    #[tokio::test]
    async fn test_relative_links_are_resolved() {
        let (_, actions, _) = setup(false).await;
        assert_eq!(
            actions.resolve_track_url("/watch?v=xyz").unwrap(),
            "https://www.youtube.com/watch?v=xyz"
        );
        assert_eq!(
            actions.resolve_track_url("https://www.youtube.com/watch?v=abs").unwrap(),
            "https://www.youtube.com/watch?v=abs"
        );
        assert!(actions.resolve_track_url("javascript:alert(1)").is_err());
    }

    #[tokio::test]
    async fn test_add_track_and_toggle_vote() {
        let (_, actions, _) = setup(false).await;
        actions
            .add_track(&TrackCandidate {
                href: "/watch?v=second".into(),
                name: Some("Second".into()),
            })
            .await
            .unwrap();

        let playlist = actions.playlist().await.unwrap();
        let added = &playlist.upcoming_tracks()[0];
        assert_eq!(added.display_name(), "Second");

        assert!(actions.toggle_vote(added).await.unwrap());
        let voted = actions.playlist().await.unwrap();
        let track = voted.track(&added.id).unwrap();
        assert_eq!(track.vote_count(), 1);

        assert!(!actions.toggle_vote(track).await.unwrap());
        let unvoted = actions.playlist().await.unwrap();
        assert_eq!(unvoted.track(&added.id).unwrap().vote_count(), 0);
    }

    #[tokio::test]
    async fn test_only_admin_removes_tracks() {
        let (_, guest, _) = setup(false).await;
        let playlist = guest.playlist().await.unwrap();
        assert!(matches!(
            guest.remove_track(&playlist.tracks[0].id).await,
            Err(SyncError::NotAdmin)
        ));

        let (backend, admin, id) = setup(true).await;
        let playlist = admin.playlist().await.unwrap();
        admin.remove_track(&playlist.tracks[0].id).await.unwrap();
        assert!(backend.playlist(&id).await.unwrap().tracks.is_empty());
    }

    #[tokio::test]
    async fn test_picked_tracks_are_submitted() {
        let (backend, actions, id) = setup(false).await;
        let actions = Arc::new(actions);
        let candidate = TrackCandidate {
            href: "/watch?v=picked".into(),
            name: None,
        };
        let picker = MemoryTrackPicker::new(vec![candidate.clone()]);
        assert_eq!(picker.detect_candidate_tracks(), vec![candidate.clone()]);

        let mut stream = backend.subscribe_playlist(&id).await.unwrap();
        let token = actions.attach_picker(&picker);
        picker.choose(&candidate);

        let snapshot = futures::StreamExt::next(&mut stream).await.unwrap();
        assert_eq!(snapshot.tracks.last().unwrap().url, "https://www.youtube.com/watch?v=picked");
        token.unsubscribe();
    }
}
