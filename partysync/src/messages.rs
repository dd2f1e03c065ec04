//! Messages exchanged between the UI surfaces and the coordinator.
//!
//! The JSON form is `{"type": "JOIN_PARTY", "payload": {...}}`.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::coordinator::PartyCoordinator;
use crate::errors::Result;
use crate::host::TabId;
use crate::model::PlaylistId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyMessage {
    /// The popup already ran the StartParty mutation.
    PartyStarted {
        id: PlaylistId,
        #[serde(default = "default_admin")]
        admin: bool,
    },
    JoinParty {
        #[serde(rename = "playlistId")]
        playlist_id: PlaylistId,
    },
    LeaveParty,
}

fn default_admin() -> bool {
    true
}

impl PartyMessage {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn kind(&self) -> &'static str {
        match self {
            PartyMessage::PartyStarted { .. } => "PARTY_STARTED",
            PartyMessage::JoinParty { .. } => "JOIN_PARTY",
            PartyMessage::LeaveParty => "LEAVE_PARTY",
        }
    }
}

/// Routes `message` to the coordinator and returns the acknowledgement sent
/// back to the UI: `true` once the transition succeeded.
///
/// Without a sender tab the message applies to the active tab.
pub async fn dispatch(
    coordinator: &PartyCoordinator,
    message: PartyMessage,
    sender: Option<TabId>,
) -> bool {
    let kind = message.kind();
    let tab = match sender {
        Some(tab) => tab,
        None => match coordinator.active_tab().await {
            Some(tab) => tab,
            None => {
                warn!(message = kind, "No active tab to route message to");
                return false;
            }
        },
    };

    let result = match message {
        PartyMessage::PartyStarted { id, admin } => {
            coordinator.party_started(id, admin, tab).await.map(|_| ())
        }
        PartyMessage::JoinParty { playlist_id } => {
            coordinator.join_party(playlist_id, tab).await.map(|_| ())
        }
        PartyMessage::LeaveParty => coordinator.leave_party(tab).await.map(|_| ()),
    };

    match result {
        Ok(()) => {
            info!(message = kind, tab = %tab, "Message handled");
            true
        }
        Err(e) => {
            warn!(message = kind, tab = %tab, "Message failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let started = PartyMessage::from_json(r#"{"type":"PARTY_STARTED","payload":{"id":"p1","admin":true}}"#)
            .unwrap();
        assert_eq!(
            started,
            PartyMessage::PartyStarted {
                id: PlaylistId::from("p1"),
                admin: true
            }
        );

        let join = PartyMessage::JoinParty {
            playlist_id: PlaylistId::from("p2"),
        };
        let json: serde_json::Value = serde_json::from_str(&join.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "JOIN_PARTY");
        assert_eq!(json["payload"]["playlistId"], "p2");

        let leave = PartyMessage::from_json(r#"{"type":"LEAVE_PARTY"}"#).unwrap();
        assert_eq!(leave, PartyMessage::LeaveParty);
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(PartyMessage::from_json(r#"{"type":"DANCE","payload":{}}"#).is_err());
    }
}
