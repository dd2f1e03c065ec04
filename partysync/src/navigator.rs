//! Moves the bound tab along with the party playlist.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::host::{TabHost, TabId};
use crate::model::Playlist;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigationDecision {
    Navigate { url: String },
    Skip(NavigationSkip),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationSkip {
    /// The snapshot has no current track.
    NoCurrentTrack,
    /// The user left the party track to watch something else.
    BrowsingElsewhere,
    /// Some tab already shows the current track.
    AlreadyOpen,
    TabClosed,
}

pub struct TabNavigator {
    host: Arc<dyn TabHost>,
}

impl TabNavigator {
    pub fn new(host: Arc<dyn TabHost>) -> Self {
        Self { host }
    }

    /// Decides from the snapshot and the tab location alone.
    ///
    /// A `Navigate` plan still has to be checked against the other open
    /// tabs, see [`navigate`](Self::navigate). Repeating a plan is harmless:
    /// once the tab reached the current track it is no longer on the last one.
    pub fn plan(next: &Playlist, tab_location: Option<&str>, forced: bool) -> NavigationDecision {
        let Some(track) = next.current_track() else {
            return NavigationDecision::Skip(NavigationSkip::NoCurrentTrack);
        };
        let Some(location) = tab_location else {
            return NavigationDecision::Skip(NavigationSkip::TabClosed);
        };

        if !forced {
            // only follow the party if the tab is still on the track that just ended
            let on_last_track = next
                .previous_track()
                .is_some_and(|last| last.url == location);
            if !on_last_track {
                return NavigationDecision::Skip(NavigationSkip::BrowsingElsewhere);
            }
        }

        NavigationDecision::Navigate {
            url: track.url.clone(),
        }
    }

    /// Applies [`plan`](Self::plan) to `tab`, unless another tab already has
    /// the track open.
    ///
    /// Host failures are logged and reported as `Skip(TabClosed)`.
    pub async fn navigate(
        &self,
        tab: TabId,
        next: &Playlist,
        forced: bool,
    ) -> NavigationDecision {
        let location = self.host.tab(tab).await.map(|info| info.url);
        let decision = Self::plan(next, location.as_deref(), forced);

        let NavigationDecision::Navigate { url } = &decision else {
            debug!(tab = %tab, playlist = %next.id, ?decision, "Navigation skipped");
            return decision;
        };

        if !self.host.tabs_with_url(url).await.is_empty() {
            debug!(tab = %tab, url = %url, "Track already open in a tab");
            return NavigationDecision::Skip(NavigationSkip::AlreadyOpen);
        }

        match self.host.navigate(tab, url).await {
            Ok(()) => {
                info!(tab = %tab, playlist = %next.id, url = %url, forced, "Tab moved to current track");
                decision
            }
            Err(e) => {
                warn!(tab = %tab, url = %url, "Navigation failed: {}", e);
                NavigationDecision::Skip(NavigationSkip::TabClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryTabHost;
    use crate::model::{Track, TrackId};

    const A: &str = "https://www.youtube.com/watch?v=A";
    const B: &str = "https://www.youtube.com/watch?v=B";
    const C: &str = "https://www.youtube.com/watch?v=C";
    const ELSEWHERE: &str = "https://www.youtube.com/watch?v=cats";

    fn playlist(current_index: Option<usize>) -> Playlist {
        let mut playlist = Playlist::new("p1", "");
        playlist.tracks = [A, B, C]
            .iter()
            .enumerate()
            .map(|(i, url)| Track {
                id: TrackId::new(i.to_string()),
                url: url.to_string(),
                name: None,
                votes: Vec::new(),
            })
            .collect();
        playlist.current_index = current_index;
        playlist
    }

    fn navigate_to(url: &str) -> NavigationDecision {
        NavigationDecision::Navigate {
            url: url.to_string(),
        }
    }

    #[test]
    fn test_follows_party_from_last_track() {
        let next = playlist(Some(1));
        assert_eq!(TabNavigator::plan(&next, Some(A), false), navigate_to(B));
    }

    #[test]
    fn test_unrelated_tab_is_left_alone() {
        let next = playlist(Some(1));
        assert_eq!(
            TabNavigator::plan(&next, Some(ELSEWHERE), false),
            NavigationDecision::Skip(NavigationSkip::BrowsingElsewhere)
        );
        // unless forced, as on first bind
        assert_eq!(TabNavigator::plan(&next, Some(ELSEWHERE), true), navigate_to(B));
    }

    #[test]
    fn test_no_current_index_never_navigates() {
        let next = playlist(None);
        for forced in [false, true] {
            assert_eq!(
                TabNavigator::plan(&next, Some(A), forced),
                NavigationDecision::Skip(NavigationSkip::NoCurrentTrack)
            );
        }
    }

    #[test]
    fn test_repeated_snapshot_still_moves_lagging_tab() {
        // the first snapshot for B may have been skipped, the next one must not be
        let next = playlist(Some(1));
        assert_eq!(TabNavigator::plan(&next, Some(A), false), navigate_to(B));
        assert_eq!(TabNavigator::plan(&next, Some(A), false), navigate_to(B));
        // a tab that already reached B stays there
        assert_eq!(
            TabNavigator::plan(&next, Some(B), false),
            NavigationDecision::Skip(NavigationSkip::BrowsingElsewhere)
        );
    }

    #[tokio::test]
    async fn test_tab_left_behind_follows_on_next_snapshot() {
        let host = Arc::new(MemoryTabHost::new());
        let tab = host.open_tab(A, true);
        let other = host.open_tab(B, false);
        let navigator = TabNavigator::new(host.clone());

        let next = playlist(Some(1));
        assert_eq!(
            navigator.navigate(tab, &next, false).await,
            NavigationDecision::Skip(NavigationSkip::AlreadyOpen)
        );

        host.close_tab(other);
        assert_eq!(navigator.navigate(tab, &next, false).await, navigate_to(B));
        assert_eq!(host.location(tab).unwrap(), B);
    }

    #[test]
    fn test_first_track_without_previous_needs_force() {
        let next = playlist(Some(0));
        assert_eq!(
            TabNavigator::plan(&next, Some(ELSEWHERE), false),
            NavigationDecision::Skip(NavigationSkip::BrowsingElsewhere)
        );
        assert_eq!(TabNavigator::plan(&next, Some(ELSEWHERE), true), navigate_to(A));
    }

    #[tokio::test]
    async fn test_navigate_updates_bound_tab() {
        let host = Arc::new(MemoryTabHost::new());
        let tab = host.open_tab(A, true);
        let navigator = TabNavigator::new(host.clone());

        let decision = navigator
            .navigate(tab, &playlist(Some(1)), false)
            .await;
        assert_eq!(decision, navigate_to(B));
        assert_eq!(host.location(tab).unwrap(), B);
    }

    #[tokio::test]
    async fn test_track_open_elsewhere_is_not_duplicated() {
        let host = Arc::new(MemoryTabHost::new());
        let tab = host.open_tab(A, true);
        host.open_tab(B, false);
        let navigator = TabNavigator::new(host.clone());

        let decision = navigator.navigate(tab, &playlist(Some(1)), true).await;
        assert_eq!(decision, NavigationDecision::Skip(NavigationSkip::AlreadyOpen));
        assert!(host.navigations().is_empty());
    }

    #[tokio::test]
    async fn test_closed_tab_is_a_no_op() {
        let host = Arc::new(MemoryTabHost::new());
        let tab = host.open_tab(A, true);
        host.close_tab(tab);
        let navigator = TabNavigator::new(host.clone());

        let decision = navigator.navigate(tab, &playlist(Some(1)), true).await;
        assert_eq!(decision, NavigationDecision::Skip(NavigationSkip::TabClosed));
    }
}
