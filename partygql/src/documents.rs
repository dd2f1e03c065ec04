//! GraphQL documents sent to the playlist server.

/// Selection shared by every operation returning a whole playlist.
macro_rules! playlist_fields {
    () => {
        "id url currentIndex currentSongStartedTimestamp currentSongPlaybackSecond \
         users { id name } \
         tracks { id url name votes { timestamp user { id name } } }"
    };
}

pub const START_PARTY: &str = concat!(
    "mutation StartParty($url: String!) { startParty(url: $url) { ",
    playlist_fields!(),
    " } }"
);

pub const JOIN_PARTY: &str = concat!(
    "mutation JoinParty($id: ID!) { joinParty(id: $id) { admin user { id name } playlist { ",
    playlist_fields!(),
    " } } }"
);

pub const LEAVE_PARTY: &str =
    "mutation LeaveParty($id: ID!, $userId: ID!) { leaveParty(id: $id, userId: $userId) }";

pub const PLAYLIST: &str = concat!(
    "query Playlist($id: ID!) { playlist(id: $id) { ",
    playlist_fields!(),
    " } }"
);

pub const PLAYLIST_UPDATED: &str = concat!(
    "subscription PlaylistUpdated($id: ID!) { playlistUpdated(id: $id) { ",
    playlist_fields!(),
    " } }"
);

pub const UPDATE_PLAYLIST: &str = "mutation UpdatePlaylist($id: ID!, \
     $currentSongStartedTimestamp: Float!, $currentSongPlaybackSecond: Float!) { \
     updatePlaylist(id: $id, currentSongStartedTimestamp: $currentSongStartedTimestamp, \
     currentSongPlaybackSecond: $currentSongPlaybackSecond) { id } }";

pub const ADD_TRACK: &str = "mutation AddTrack($playlistId: ID!, $url: String!, $name: String, \
     $userId: ID!) { addTrack(playlistId: $playlistId, url: $url, name: $name, userId: $userId) { id } }";

pub const REMOVE_TRACK: &str = "mutation RemoveTrack($playlistId: ID!, $trackId: ID!) { \
     removeTrack(playlistId: $playlistId, trackId: $trackId) { id } }";

pub const VOTE: &str =
    "mutation Vote($trackId: ID!, $userId: ID!) { vote(trackId: $trackId, userId: $userId) { id } }";

pub const REMOVE_VOTE: &str = "mutation RemoveVote($trackId: ID!, $userId: ID!) { \
     removeVote(trackId: $trackId, userId: $userId) { id } }";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_selection_is_shared() {
        for document in [START_PARTY, JOIN_PARTY, PLAYLIST, PLAYLIST_UPDATED] {
            assert!(document.contains("currentSongStartedTimestamp"), "{document}");
            assert!(document.contains("votes { timestamp user { id name } }"), "{document}");
        }
        assert!(JOIN_PARTY.contains("admin user { id name }"));
    }
}
