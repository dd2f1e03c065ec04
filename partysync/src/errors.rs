use thiserror::Error;

use crate::host::TabId;
use crate::model::PlaylistId;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Subscription error for playlist {0}: {1}")]
    Subscription(PlaylistId, String),
    #[error("Party store error: {0}")]
    Store(String),
    #[error("Host error: {0}")]
    Host(String),
    #[error("Tab {0} is closed")]
    TabClosed(TabId),
    #[error("No active tab to route the message to")]
    NoActiveTab,
    #[error("Request superseded by a later party transition")]
    Superseded,
    #[error("Party coordinator is not running")]
    CoordinatorStopped,
    #[error("Invalid track url: {0}")]
    InvalidTrackUrl(String),
    #[error("Only the party admin can do that")]
    NotAdmin,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn backend(message: impl Into<String>) -> Self {
        SyncError::Backend(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        SyncError::Store(message.into())
    }

    pub fn host(message: impl Into<String>) -> Self {
        SyncError::Host(message.into())
    }

    /// Rebuilds an equivalent error so it can be handed to several waiters.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            SyncError::Backend(m) => SyncError::Backend(m.clone()),
            SyncError::Subscription(id, m) => SyncError::Subscription(id.clone(), m.clone()),
            SyncError::Store(m) => SyncError::Store(m.clone()),
            SyncError::Host(m) => SyncError::Host(m.clone()),
            SyncError::TabClosed(tab) => SyncError::TabClosed(*tab),
            SyncError::NoActiveTab => SyncError::NoActiveTab,
            SyncError::Superseded => SyncError::Superseded,
            SyncError::CoordinatorStopped => SyncError::CoordinatorStopped,
            SyncError::InvalidTrackUrl(m) => SyncError::InvalidTrackUrl(m.clone()),
            SyncError::NotAdmin => SyncError::NotAdmin,
            SyncError::Json(e) => SyncError::Store(e.to_string()),
            SyncError::Io(e) => SyncError::Store(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
