//! `graphql-transport-ws` client for `PlaylistUpdated` subscriptions.
//!
//! One WebSocket connection per subscription:
//!
//! 1. `connection_init` → `connection_ack`
//! 2. `subscribe` with the `PlaylistUpdated` document
//! 3. every `next` carries a full playlist snapshot
//!
//! Dropping the returned stream sends `complete` and closes the socket.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use partysync::{Playlist, PlaylistId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{GraphqlError, GraphqlResponse};
use crate::documents;
use crate::error::{Error, Result};

/// Subprotocol negotiated with the server.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Messages of the graphql-transport-ws protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolMessage {
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Next {
        id: String,
        payload: GraphqlResponse,
    },
    Error {
        id: String,
        payload: Vec<GraphqlError>,
    },
    Complete {
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    pub query: String,
    pub variables: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl ProtocolMessage {
    fn to_message(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }

    fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// What the reader loop does with one protocol message.
#[derive(Debug, PartialEq)]
enum Step {
    Snapshot(Box<Playlist>),
    Reply(ProtocolMessage),
    Ignore,
    Finished,
}

fn step(subscription_id: &str, message: ProtocolMessage) -> Step {
    match message {
        ProtocolMessage::Next { id, payload } if id == subscription_id => {
            match payload.into_field::<Playlist>("playlistUpdated") {
                Ok(playlist) => Step::Snapshot(Box::new(playlist)),
                Err(e) => {
                    warn!(subscription = %id, "Invalid PlaylistUpdated payload: {}", e);
                    Step::Ignore
                }
            }
        }
        ProtocolMessage::Error { id, payload } if id == subscription_id => {
            let messages: Vec<_> = payload.into_iter().map(|e| e.message).collect();
            warn!(subscription = %id, errors = ?messages, "Subscription rejected by server");
            Step::Finished
        }
        ProtocolMessage::Complete { id } if id == subscription_id => Step::Finished,
        ProtocolMessage::Ping { .. } => Step::Reply(ProtocolMessage::Pong { payload: None }),
        _ => Step::Ignore,
    }
}

/// Opens a `PlaylistUpdated` subscription on `ws_url`.
///
/// Resolves once the server acknowledged the connection and the subscribe
/// message went out.
pub async fn subscribe_playlist(
    ws_url: &str,
    playlist_id: &PlaylistId,
    handshake_timeout: Duration,
) -> Result<UnboundedReceiverStream<Playlist>> {
    let mut request = ws_url.into_client_request()?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

    let (mut socket, _) = tokio::time::timeout(handshake_timeout, connect_async(request))
        .await
        .map_err(|_| Error::Timeout)??;

    socket
        .send(ProtocolMessage::ConnectionInit { payload: None }.to_message()?)
        .await?;
    tokio::time::timeout(handshake_timeout, wait_for_ack(&mut socket))
        .await
        .map_err(|_| Error::Timeout)??;

    let subscription_id = Uuid::new_v4().to_string();
    let subscribe = ProtocolMessage::Subscribe {
        id: subscription_id.clone(),
        payload: SubscribePayload {
            query: documents::PLAYLIST_UPDATED.to_string(),
            variables: json!({ "id": playlist_id }),
            operation_name: Some("PlaylistUpdated".to_string()),
        },
    };
    socket.send(subscribe.to_message()?).await?;
    info!(playlist = %playlist_id, subscription = %subscription_id, "PlaylistUpdated subscription opened");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_snapshots(socket, subscription_id, playlist_id.clone(), tx));
    Ok(UnboundedReceiverStream::new(rx))
}

async fn wait_for_ack(socket: &mut Socket) -> Result<()> {
    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => match ProtocolMessage::parse(text.as_str())? {
                ProtocolMessage::ConnectionAck { .. } => return Ok(()),
                ProtocolMessage::Ping { .. } => {
                    socket
                        .send(ProtocolMessage::Pong { payload: None }.to_message()?)
                        .await?;
                }
                other => {
                    return Err(Error::protocol(format!(
                        "expected connection_ack, got {other:?}"
                    )))
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(Error::protocol("connection closed before connection_ack"))
}

async fn read_snapshots(
    mut socket: Socket,
    subscription_id: String,
    playlist_id: PlaylistId,
    tx: mpsc::UnboundedSender<Playlist>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!(playlist = %playlist_id, "Subscription dropped by consumer, completing");
                let complete = ProtocolMessage::Complete { id: subscription_id.clone() };
                if let Ok(message) = complete.to_message() {
                    let _ = socket.send(message).await;
                }
                let _ = socket.close(None).await;
                return;
            }
            message = socket.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(playlist = %playlist_id, "Subscription socket closed by server");
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(playlist = %playlist_id, "Subscription socket error: {}", e);
                        return;
                    }
                };

                let parsed = match ProtocolMessage::parse(text.as_str()) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(playlist = %playlist_id, "Unreadable subscription message: {}", e);
                        continue;
                    }
                };

                match step(&subscription_id, parsed) {
                    Step::Snapshot(playlist) => {
                        if tx.send(*playlist).is_err() {
                            return;
                        }
                    }
                    Step::Reply(reply) => {
                        if let Ok(message) = reply.to_message() {
                            let _ = socket.send(message).await;
                        }
                    }
                    Step::Ignore => {}
                    Step::Finished => {
                        info!(playlist = %playlist_id, "Subscription completed by server");
                        let _ = socket.close(None).await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_message_shape() {
        let message = ProtocolMessage::Subscribe {
            id: "1".into(),
            payload: SubscribePayload {
                query: "subscription { x }".into(),
                variables: json!({ "id": "p1" }),
                operation_name: None,
            },
        };
        let value: Value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "subscribe",
                "id": "1",
                "payload": { "query": "subscription { x }", "variables": { "id": "p1" } }
            })
        );

        let init = serde_json::to_value(ProtocolMessage::ConnectionInit { payload: None }).unwrap();
        assert_eq!(init, json!({ "type": "connection_init" }));
    }

    #[test]
    fn test_next_yields_snapshot() {
        let raw = r#"{
            "type": "next",
            "id": "sub",
            "payload": { "data": { "playlistUpdated": {
                "id": "p1", "url": "", "currentIndex": 1,
                "currentSongStartedTimestamp": "1700000000000",
                "currentSongPlaybackSecond": 12.5,
                "tracks": [], "users": []
            } } }
        }"#;
        let Step::Snapshot(playlist) = step("sub", ProtocolMessage::parse(raw).unwrap()) else {
            panic!("expected a snapshot");
        };
        assert_eq!(playlist.id, PlaylistId::from("p1"));
        assert_eq!(playlist.current_index, Some(1));
        assert_eq!(playlist.current_song_started_timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn test_other_subscription_ids_are_ignored() {
        let complete = ProtocolMessage::Complete { id: "other".into() };
        assert_eq!(step("sub", complete), Step::Ignore);

        let complete = ProtocolMessage::Complete { id: "sub".into() };
        assert_eq!(step("sub", complete), Step::Finished);
    }

    #[test]
    fn test_server_ping_is_answered() {
        let ping = ProtocolMessage::parse(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(step("sub", ping), Step::Reply(ProtocolMessage::Pong { payload: None }));
    }

    #[test]
    fn test_error_ends_subscription() {
        let raw = r#"{"type":"error","id":"sub","payload":[{"message":"no such playlist"}]}"#;
        assert_eq!(step("sub", ProtocolMessage::parse(raw).unwrap()), Step::Finished);
    }
}
