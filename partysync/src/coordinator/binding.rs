use tokio::sync::oneshot;

use crate::channel::SubscriptionHandle;
use crate::errors::{Result, SyncError};
use crate::host::TabId;
use crate::model::PlaylistId;

use super::JoinOutcome;

/// Snapshot of the coordinator's binding, as returned by
/// [`PartyCoordinator::binding`](super::PartyCoordinator::binding).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Binding {
    #[default]
    Unbound,
    /// A tab is reserved; its subscription is being opened.
    Opening { tab: TabId, playlist_id: PlaylistId },
    Bound {
        tab: TabId,
        playlist_id: PlaylistId,
        /// Id of the open [`SubscriptionHandle`].
        subscription: u64,
    },
}

impl Binding {
    /// The bound tab; only set while a subscription is open.
    pub fn bound_tab(&self) -> Option<TabId> {
        match self {
            Binding::Bound { tab, .. } => Some(*tab),
            _ => None,
        }
    }

    pub fn playlist_id(&self) -> Option<&PlaylistId> {
        match self {
            Binding::Unbound => None,
            Binding::Opening { playlist_id, .. } | Binding::Bound { playlist_id, .. } => {
                Some(playlist_id)
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Binding::Bound { .. })
    }
}

/// Caller waiting for a bind to complete.
pub(crate) enum PendingReply {
    Start(oneshot::Sender<Result<PlaylistId>>),
    Join(Option<oneshot::Sender<Result<JoinOutcome>>>),
}

impl PendingReply {
    pub(crate) fn succeed(self, playlist_id: &PlaylistId) {
        match self {
            PendingReply::Start(tx) => {
                let _ = tx.send(Ok(playlist_id.clone()));
            }
            PendingReply::Join(Some(tx)) => {
                let _ = tx.send(Ok(JoinOutcome::Bound));
            }
            PendingReply::Join(None) => {}
        }
    }

    pub(crate) fn fail(self, error: SyncError) {
        match self {
            PendingReply::Start(tx) => {
                let _ = tx.send(Err(error));
            }
            PendingReply::Join(Some(tx)) => {
                let _ = tx.send(Err(error));
            }
            PendingReply::Join(None) => {}
        }
    }
}

/// Worker-side binding state.
pub(crate) enum BindingState {
    Unbound,
    Opening {
        tab: TabId,
        playlist_id: PlaylistId,
        generation: u64,
        replies: Vec<PendingReply>,
    },
    Bound {
        tab: TabId,
        playlist_id: PlaylistId,
        generation: u64,
        handle: SubscriptionHandle,
    },
}

impl BindingState {
    pub(crate) fn view(&self) -> Binding {
        match self {
            BindingState::Unbound => Binding::Unbound,
            BindingState::Opening {
                tab, playlist_id, ..
            } => Binding::Opening {
                tab: *tab,
                playlist_id: playlist_id.clone(),
            },
            BindingState::Bound {
                tab,
                playlist_id,
                handle,
                ..
            } => Binding::Bound {
                tab: *tab,
                playlist_id: playlist_id.clone(),
                subscription: handle.id(),
            },
        }
    }

    pub(crate) fn tab(&self) -> Option<TabId> {
        match self {
            BindingState::Unbound => None,
            BindingState::Opening { tab, .. } | BindingState::Bound { tab, .. } => Some(*tab),
        }
    }

    pub(crate) fn playlist_id(&self) -> Option<&PlaylistId> {
        match self {
            BindingState::Unbound => None,
            BindingState::Opening { playlist_id, .. } | BindingState::Bound { playlist_id, .. } => {
                Some(playlist_id)
            }
        }
    }

    pub(crate) fn generation(&self) -> Option<u64> {
        match self {
            BindingState::Unbound => None,
            BindingState::Opening { generation, .. } | BindingState::Bound { generation, .. } => {
                Some(*generation)
            }
        }
    }

    /// Drops the binding: closes the open subscription, fails the callers
    /// still waiting for one with `error`.
    pub(crate) fn release(&mut self, error: impl Fn() -> SyncError) {
        match std::mem::replace(self, BindingState::Unbound) {
            BindingState::Unbound => {}
            BindingState::Opening { replies, .. } => {
                for reply in replies {
                    reply.fail(error());
                }
            }
            BindingState::Bound { handle, .. } => {
                handle.close();
            }
        }
    }
}
