//! GraphQL implementation of [`PlaylistBackend`].
//!
//! Queries and mutations are POSTed to the HTTP endpoint; `PlaylistUpdated`
//! subscriptions go through [`crate::subscription`].
//!
//! ```no_run
//! use partygql::GraphqlBackend;
//! use partysync::{PlaylistBackend, PlaylistId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = GraphqlBackend::builder()
//!     .http_url("https://party.example.org/graphql")
//!     .ws_url("wss://party.example.org/graphql")
//!     .build()?;
//! let playlist = backend.playlist(&PlaylistId::from("p1")).await?;
//! println!("{} tracks", playlist.tracks.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use partysync::{
    JoinedParty, PlaybackAnchor, Playlist, PlaylistBackend, PlaylistId, SnapshotStream, SyncError,
    TrackId, UserId,
};
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::documents;
use crate::error::{Error, Result};
use crate::subscription;

/// Default HTTP endpoint
pub const DEFAULT_HTTP_URL: &str = "http://localhost:4000/graphql";

/// Default subscription endpoint
pub const DEFAULT_WS_URL: &str = "ws://localhost:4000/graphql";

/// Default timeout for HTTP requests and WebSocket handshakes (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_USER_AGENT: &str = "partysync/0.1 (partygql)";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
}

/// `{data, errors}` envelope of every GraphQL answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
}

impl GraphqlResponse {
    /// Deserializes `data.<field>`, failing on any reported error.
    pub fn into_field<T: DeserializeOwned>(self, field: &str) -> Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(Error::Graphql(messages.join("; ")));
        }
        let value = self
            .data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .ok_or_else(|| Error::MissingData(field.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Playlist backend talking to the party GraphQL server.
#[derive(Debug, Clone)]
pub struct GraphqlBackend {
    client: Client,
    http_url: Url,
    ws_url: Url,
    timeout: Duration,
}

impl GraphqlBackend {
    pub fn builder() -> GraphqlBackendBuilder {
        GraphqlBackendBuilder::default()
    }

    /// Builds a backend from the `backend` section of the configuration
    #[cfg(feature = "partyconfig")]
    pub fn from_config() -> Result<Self> {
        use crate::config_ext::GraphqlConfigExt;

        let config = partyconfig::get_config();
        Self::builder()
            .http_url(config.get_graphql_http_url()?)
            .ws_url(config.get_graphql_ws_url()?)
            .timeout(Duration::from_secs(config.get_graphql_timeout_secs()?))
            .build()
    }

    pub fn http_url(&self) -> &Url {
        &self.http_url
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }

    /// Runs one query or mutation and deserializes `data.<field>`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Value,
        field: &str,
    ) -> Result<T> {
        debug!(field, "GraphQL request");
        let response = self
            .client
            .post(self.http_url.clone())
            .timeout(self.timeout)
            .json(&GraphqlRequest {
                query: document,
                variables,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            // servers usually still send an `errors` envelope with a 4xx
            return match response.json::<GraphqlResponse>().await {
                Ok(body) if !body.errors.is_empty() => body.into_field(field),
                _ => Err(Error::Graphql(format!("HTTP {status}"))),
            };
        }

        let body: GraphqlResponse = response.json().await?;
        body.into_field(field).inspect_err(|e| {
            warn!(field, "GraphQL operation failed: {}", e);
        })
    }

    async fn mutate(&self, document: &str, variables: Value, field: &str) -> Result<()> {
        self.execute::<IgnoredAny>(document, variables, field)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl PlaylistBackend for GraphqlBackend {
    async fn start_party(&self, url: &str) -> partysync::Result<Playlist> {
        Ok(self
            .execute(documents::START_PARTY, json!({ "url": url }), "startParty")
            .await?)
    }

    async fn join_party(&self, playlist_id: &PlaylistId) -> partysync::Result<JoinedParty> {
        Ok(self
            .execute(documents::JOIN_PARTY, json!({ "id": playlist_id }), "joinParty")
            .await?)
    }

    async fn leave_party(&self, playlist_id: &PlaylistId, user_id: &UserId) -> partysync::Result<()> {
        Ok(self
            .mutate(
                documents::LEAVE_PARTY,
                json!({ "id": playlist_id, "userId": user_id }),
                "leaveParty",
            )
            .await?)
    }

    async fn playlist(&self, playlist_id: &PlaylistId) -> partysync::Result<Playlist> {
        Ok(self
            .execute(documents::PLAYLIST, json!({ "id": playlist_id }), "playlist")
            .await?)
    }

    async fn subscribe_playlist(&self, playlist_id: &PlaylistId) -> partysync::Result<SnapshotStream> {
        let stream = subscription::subscribe_playlist(self.ws_url.as_str(), playlist_id, self.timeout)
            .await
            .map_err(|e| SyncError::Subscription(playlist_id.clone(), e.to_string()))?;
        Ok(stream.boxed())
    }

    async fn update_playlist(&self, playlist_id: &PlaylistId, anchor: PlaybackAnchor) -> partysync::Result<()> {
        Ok(self
            .mutate(
                documents::UPDATE_PLAYLIST,
                json!({
                    "id": playlist_id,
                    "currentSongStartedTimestamp": anchor.started_at_ms,
                    "currentSongPlaybackSecond": anchor.playback_second,
                }),
                "updatePlaylist",
            )
            .await?)
    }

    async fn add_track(
        &self,
        playlist_id: &PlaylistId,
        url: &str,
        name: Option<&str>,
        user_id: &UserId,
    ) -> partysync::Result<()> {
        Ok(self
            .mutate(
                documents::ADD_TRACK,
                json!({
                    "playlistId": playlist_id,
                    "url": url,
                    "name": name,
                    "userId": user_id,
                }),
                "addTrack",
            )
            .await?)
    }

    async fn remove_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> partysync::Result<()> {
        Ok(self
            .mutate(
                documents::REMOVE_TRACK,
                json!({ "playlistId": playlist_id, "trackId": track_id }),
                "removeTrack",
            )
            .await?)
    }

    async fn vote(&self, track_id: &TrackId, user_id: &UserId) -> partysync::Result<()> {
        Ok(self
            .mutate(
                documents::VOTE,
                json!({ "trackId": track_id, "userId": user_id }),
                "vote",
            )
            .await?)
    }

    async fn remove_vote(&self, track_id: &TrackId, user_id: &UserId) -> partysync::Result<()> {
        Ok(self
            .mutate(
                documents::REMOVE_VOTE,
                json!({ "trackId": track_id, "userId": user_id }),
                "removeVote",
            )
            .await?)
    }
}

/// Builder for configuring a [`GraphqlBackend`]
#[derive(Debug)]
pub struct GraphqlBackendBuilder {
    client: Option<Client>,
    http_url: String,
    ws_url: String,
    timeout: Duration,
    user_agent: String,
}

impl Default for GraphqlBackendBuilder {
    fn default() -> Self {
        Self {
            client: None,
            http_url: DEFAULT_HTTP_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl GraphqlBackendBuilder {
    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn http_url(mut self, url: impl Into<String>) -> Self {
        self.http_url = url.into();
        self
    }

    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the request and handshake timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<GraphqlBackend> {
        let http_url = Url::parse(&self.http_url)?;
        let ws_url = Url::parse(&self.ws_url)?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(Error::protocol(format!(
                "subscription endpoint must use ws:// or wss://, got {ws_url}"
            )));
        }

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(GraphqlBackend {
            client,
            http_url,
            ws_url,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_field_reports_errors() {
        let body: GraphqlResponse = serde_json::from_str(
            r#"{"data": null, "errors": [{"message": "party not found"}, {"message": "again"}]}"#,
        )
        .unwrap();
        match body.into_field::<Playlist>("playlist") {
            Err(Error::Graphql(message)) => assert_eq!(message, "party not found; again"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_into_field_requires_field() {
        let body: GraphqlResponse = serde_json::from_str(r#"{"data": {"other": 1}}"#).unwrap();
        assert!(matches!(
            body.into_field::<IgnoredAny>("playlist"),
            Err(Error::MissingData(field)) if field == "playlist"
        ));

        // a null result still counts as an answer
        let body: GraphqlResponse = serde_json::from_str(r#"{"data": {"leaveParty": null}}"#).unwrap();
        assert!(body.into_field::<IgnoredAny>("leaveParty").is_ok());
    }

    #[test]
    fn test_join_payload_parses() {
        let body: GraphqlResponse = serde_json::from_str(
            r#"{"data": {"joinParty": {
                "admin": false,
                "user": {"id": "u2", "name": null},
                "playlist": {"id": "p1", "url": "https://www.youtube.com/watch?v=a&playlistPartyId=p1",
                             "currentIndex": 0, "tracks": [
                                {"id": "t1", "url": "https://www.youtube.com/watch?v=a", "name": "A",
                                 "votes": [{"timestamp": "1700000000000", "user": {"id": "u1"}}]}
                             ]}
            }}}"#,
        )
        .unwrap();
        let joined: JoinedParty = body.into_field("joinParty").unwrap();
        assert_eq!(joined.user.id, UserId::from("u2"));
        assert_eq!(joined.playlist.current_track().unwrap().vote_count(), 1);
        assert!(!joined.admin);
    }

    #[test]
    fn test_builder_rejects_http_subscription_url() {
        let result = GraphqlBackend::builder()
            .ws_url("http://localhost:4000/graphql")
            .build();
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
