//! Party, playlist and track snapshots exchanged with the backend.
//!
//! Everything here is a plain value: the backend owns the playlist and the
//! client only ever holds immutable snapshots of it.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Backend identifier of a party playlist.
    PlaylistId
);
string_id!(
    /// Backend identifier of a party member.
    UserId
);
string_id!(TrackId);

/// Local membership record, persisted for the lifetime of the membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub playlist_id: PlaylistId,
    pub user_id: UserId,
    pub is_admin: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub user: User,
    /// Milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "de_millis")]
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl Track {
    /// Name shown to users; falls back to the url for unnamed tracks.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Default thumbnail of a `watch?v=` video url.
    pub fn thumbnail_url(&self) -> String {
        let video = self.url.rsplit("watch?v=").next().unwrap_or(&self.url);
        let video = video.split('&').next().unwrap_or(video);
        format!("https://i.ytimg.com/vi/{video}/default.jpg")
    }

    pub fn has_vote_from(&self, user: &UserId) -> bool {
        self.votes.iter().any(|vote| &vote.user.id == user)
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }
}

/// Snapshot of a party playlist as broadcast by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: PlaylistId,
    /// Invitation link of the party.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default, deserialize_with = "de_opt_index")]
    pub current_index: Option<usize>,
    /// When the admin last anchored playback, in milliseconds since the epoch.
    #[serde(default, deserialize_with = "de_opt_millis")]
    pub current_song_started_timestamp: Option<i64>,
    /// Playback second of the current track at `current_song_started_timestamp`.
    #[serde(default)]
    pub current_song_playback_second: Option<f64>,
    #[serde(default)]
    pub users: Vec<User>,
}

impl Playlist {
    pub fn new(id: impl Into<PlaylistId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            tracks: Vec::new(),
            current_index: None,
            current_song_started_timestamp: None,
            current_song_playback_second: None,
            users: Vec::new(),
        }
    }

    /// `tracks[current_index]`, if the index is set and in range.
    pub fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.tracks.get(i))
    }

    /// `tracks[current_index - 1]`, the track the party just finished.
    pub fn previous_track(&self) -> Option<&Track> {
        self.current_index
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.tracks.get(i))
    }

    /// Tracks queued after the current one.
    ///
    /// Without a current index the whole playlist is upcoming.
    pub fn upcoming_tracks(&self) -> &[Track] {
        match self.current_index {
            None => &self.tracks,
            Some(i) if i < self.tracks.len() => &self.tracks[i + 1..],
            Some(_) => &[],
        }
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|track| &track.id == id)
    }
}

/// Result of a JoinParty mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinedParty {
    pub playlist: Playlist,
    pub user: User,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    fn as_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Int(v) => Some(*v as f64),
            RawNumber::Float(v) => Some(*v),
            RawNumber::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

// GraphQL servers disagree on how they encode timestamps: Int, Float or a
// numeric string are all accepted.
fn de_opt_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawNumber>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|n| n.as_f64())
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as i64))
}

fn de_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_millis(deserializer)?.unwrap_or_default())
}

fn de_opt_index<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|i| usize::try_from(i).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track {
            id: TrackId::from(id),
            url: format!("https://www.youtube.com/watch?v={id}"),
            name: None,
            votes: Vec::new(),
        }
    }

    fn playlist(current_index: Option<usize>) -> Playlist {
        let mut playlist = Playlist::new("p1", "https://www.youtube.com/?playlistPartyId=p1");
        playlist.tracks = vec![track("a"), track("b"), track("c")];
        playlist.current_index = current_index;
        playlist
    }

    #[test]
    fn test_track_views() {
        let p = playlist(Some(1));
        assert_eq!(p.current_track().unwrap().id.as_str(), "b");
        assert_eq!(p.previous_track().unwrap().id.as_str(), "a");
        assert_eq!(p.upcoming_tracks().len(), 1);

        let first = playlist(Some(0));
        assert!(first.previous_track().is_none());

        let none = playlist(None);
        assert!(none.current_track().is_none());
        assert_eq!(none.upcoming_tracks().len(), 3);

        let out_of_range = playlist(Some(7));
        assert!(out_of_range.current_track().is_none());
        assert!(out_of_range.upcoming_tracks().is_empty());
    }

    #[test]
    fn test_playlist_deserializes_graphql_payload() {
        let json = r#"{
            "id": "p1",
            "url": "https://www.youtube.com/watch?v=a&playlistPartyId=p1",
            "tracks": [
                {"id": "t1", "url": "https://www.youtube.com/watch?v=a", "name": "A",
                 "votes": [{"user": {"id": "u2"}, "timestamp": "1600000000000"}]}
            ],
            "currentIndex": 0,
            "currentSongStartedTimestamp": 1600000000123.0,
            "currentSongPlaybackSecond": 30,
            "users": [{"id": "u1", "name": "admin"}]
        }"#;

        let p: Playlist = serde_json::from_str(json).unwrap();
        assert_eq!(p.current_song_started_timestamp, Some(1_600_000_000_123));
        assert_eq!(p.current_song_playback_second, Some(30.0));
        assert_eq!(p.tracks[0].votes[0].timestamp, 1_600_000_000_000);
        assert!(p.tracks[0].has_vote_from(&UserId::from("u2")));
        assert_eq!(p.tracks[0].display_name(), "A");
        assert_eq!(p.tracks[0].thumbnail_url(), "https://i.ytimg.com/vi/a/default.jpg");
    }

    #[test]
    fn test_playlist_tolerates_missing_and_negative_fields() {
        let p: Playlist =
            serde_json::from_str(r#"{"id": "p1", "currentIndex": -1, "currentSongStartedTimestamp": null}"#)
                .unwrap();
        assert!(p.tracks.is_empty());
        assert_eq!(p.current_index, None);
        assert_eq!(p.current_song_started_timestamp, None);
    }

    #[test]
    fn test_party_uses_camel_case_keys() {
        let party = Party {
            playlist_id: PlaylistId::from("p1"),
            user_id: UserId::from("u1"),
            is_admin: true,
        };
        let json = serde_json::to_value(&party).unwrap();
        assert_eq!(json["playlistId"], "p1");
        assert_eq!(json["isAdmin"], true);
    }
}
