//! Party membership coordinator.
//!
//! One coordinator per browser instance binds at most one tab to the active
//! party, owns the playlist subscription of that tab and serializes every
//! start / join / leave transition.
//!
//! All state lives in a single worker task draining a command queue. Backend
//! calls and subscription setup run in spawned tasks that post their result
//! back to the queue, tagged with the intent sequence number (or binding
//! generation) they were issued under; stale results are discarded. Among
//! concurrent start / join / leave requests, the last one issued wins.

mod binding;
mod worker;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::backend::PlaylistBackend;
use crate::channel::{PlaylistSubscriptionChannel, SnapshotChannel};
use crate::errors::{Result, SyncError};
use crate::events::{EventSource, UnsubscribeToken};
use crate::host::{HostEvent, TabHost, TabId};
use crate::messages::{self, PartyMessage};
use crate::model::{PlaylistId, UserId};
use crate::store::PartyStore;

pub use binding::Binding;

use worker::{Command, Worker};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Tabs whose host contains this fragment belong to the party site.
    pub site_host_fragment: String,
    /// Identity of the local user, used as admin id for parties started here.
    pub user_id: UserId,
}

impl CoordinatorSettings {
    pub fn new(site_host_fragment: impl Into<String>, user_id: impl Into<UserId>) -> Self {
        Self {
            site_host_fragment: site_host_fragment.into(),
            user_id: user_id.into(),
        }
    }

    #[cfg(feature = "partyconfig")]
    pub fn from_config() -> Result<Self> {
        use crate::config_ext::PartySyncConfigExt;

        partyconfig::get_config().coordinator_settings()
    }
}

/// Collaborators of the coordinator.
pub struct CoordinatorDeps {
    pub backend: Arc<dyn PlaylistBackend>,
    pub channel: Arc<dyn SnapshotChannel>,
    pub host: Arc<dyn TabHost>,
    pub store: Arc<dyn PartyStore>,
    pub settings: CoordinatorSettings,
}

impl CoordinatorDeps {
    /// Subscriptions go through the backend's own `PlaylistUpdated` stream.
    pub fn new(
        backend: Arc<dyn PlaylistBackend>,
        host: Arc<dyn TabHost>,
        store: Arc<dyn PartyStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        let channel = Arc::new(PlaylistSubscriptionChannel::new(backend.clone()));
        Self {
            backend,
            channel,
            host,
            store,
            settings,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn SnapshotChannel>) -> Self {
        self.channel = channel;
        self
    }
}

/// Outcome of a successful join.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The tab is now bound and subscribed.
    Bound,
    /// The tab was already bound to this party; the snapshot was applied as
    /// an update.
    Updated,
    /// Another tab is bound to this party; nothing changed locally.
    Observed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    /// There was no party to leave.
    NoParty,
}

/// Handle to the coordinator worker. Cheap to clone.
///
/// The worker stops, closing any open subscription, when the last handle is
/// dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct PartyCoordinator {
    tx: mpsc::UnboundedSender<Command>,
    host: Arc<dyn TabHost>,
}

impl PartyCoordinator {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(deps: CoordinatorDeps) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = deps.host.clone();
        let worker = Worker::new(deps, tx.downgrade());
        tokio::spawn(worker.run(rx));
        info!("Party coordinator started");
        Self { tx, host }
    }

    /// Starts a party seeded with `url` and binds `tab` to it as admin.
    ///
    /// Resolves with the new playlist id once its subscription is open.
    pub async fn start_party(&self, url: impl Into<String>, tab: TabId) -> Result<PlaylistId> {
        let url = url.into();
        self.request(|reply| Command::StartParty { url, tab, reply })
            .await?
    }

    /// Binds `tab` to a party whose StartParty mutation already ran elsewhere.
    pub async fn party_started(
        &self,
        playlist_id: PlaylistId,
        admin: bool,
        tab: TabId,
    ) -> Result<PlaylistId> {
        self.request(|reply| Command::PartyStarted {
            playlist_id,
            admin,
            tab,
            reply,
        })
        .await?
    }

    pub async fn join_party(&self, playlist_id: PlaylistId, tab: TabId) -> Result<JoinOutcome> {
        self.request(|reply| Command::JoinParty {
            playlist_id,
            tab,
            reply: Some(reply),
        })
        .await?
    }

    /// Leaves the persisted party. Safe to call without one.
    ///
    /// Local teardown (subscription, binding, persisted party) is done before
    /// the LeaveParty mutation is issued; the call resolves once the mutation
    /// settles.
    pub async fn leave_party(&self, tab: TabId) -> Result<LeaveOutcome> {
        self.request(|reply| Command::LeaveParty {
            tab: Some(tab),
            reply: Some(reply),
        })
        .await?
    }

    pub fn tab_closed(&self, tab: TabId) -> Result<()> {
        self.send(Command::TabClosed { tab })
    }

    pub fn tab_loaded(&self, tab: TabId, url: impl Into<String>, active: bool) -> Result<()> {
        self.send(Command::TabLoaded {
            tab,
            url: url.into(),
            active,
        })
    }

    pub async fn binding(&self) -> Result<Binding> {
        self.request(|reply| Command::Binding { reply }).await
    }

    /// Routes a UI message; see [`messages::dispatch`].
    pub async fn dispatch(&self, message: PartyMessage, sender: Option<TabId>) -> bool {
        messages::dispatch(self, message, sender).await
    }

    pub(crate) async fn active_tab(&self) -> Option<TabId> {
        self.host.active_tab().await.map(|tab| tab.id)
    }

    /// Feeds tab lifecycle events from `events` to the coordinator.
    ///
    /// The subscription does not keep the worker alive.
    pub fn attach(&self, events: &EventSource<HostEvent>) -> UnsubscribeToken {
        let weak = self.tx.downgrade();
        events.subscribe(move |event: &HostEvent| {
            let Some(tx) = weak.upgrade() else {
                return;
            };
            let command = match event {
                HostEvent::TabLoaded { tab, url, active } => Command::TabLoaded {
                    tab: *tab,
                    url: url.clone(),
                    active: *active,
                },
                HostEvent::TabClosed { tab } => Command::TabClosed { tab: *tab },
            };
            let _ = tx.send(command);
        })
    }

    /// Stops the worker after the commands already queued.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| SyncError::CoordinatorStopped)
    }

    async fn request<T, F>(&self, build: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| SyncError::CoordinatorStopped)
    }
}
