use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::channel::{SnapshotHandler, SubscriptionHandle};
use crate::errors::{Result, SyncError};
use crate::host::{matches_site, party_id_from_url, TabId};
use crate::model::{JoinedParty, Party, Playlist, PlaylistId};
use crate::navigator::TabNavigator;

use super::binding::{Binding, BindingState, PendingReply};
use super::{CoordinatorDeps, JoinOutcome, LeaveOutcome};

type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    StartParty {
        url: String,
        tab: TabId,
        reply: Reply<PlaylistId>,
    },
    PartyStarted {
        playlist_id: PlaylistId,
        admin: bool,
        tab: TabId,
        reply: Reply<PlaylistId>,
    },
    JoinParty {
        playlist_id: PlaylistId,
        tab: TabId,
        reply: Option<Reply<JoinOutcome>>,
    },
    LeaveParty {
        tab: Option<TabId>,
        reply: Option<Reply<LeaveOutcome>>,
    },
    TabClosed {
        tab: TabId,
    },
    TabLoaded {
        tab: TabId,
        url: String,
        active: bool,
    },
    Binding {
        reply: oneshot::Sender<Binding>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },

    // Continuations posted by spawned tasks
    PartyReady {
        seq: u64,
        tab: TabId,
        admin: bool,
        result: Result<Playlist>,
        reply: Reply<PlaylistId>,
    },
    PartyJoined {
        seq: u64,
        tab: TabId,
        result: Result<JoinedParty>,
        reply: Option<Reply<JoinOutcome>>,
    },
    SubscriptionOpened {
        generation: u64,
        result: Result<SubscriptionHandle>,
    },
    Snapshot {
        generation: u64,
        playlist: Playlist,
    },
}

fn post(tx: &mpsc::WeakUnboundedSender<Command>, command: Command) {
    // worker gone: the command (and any subscription handle in it) is dropped
    if let Some(tx) = tx.upgrade() {
        let _ = tx.send(command);
    }
}

fn answer<T>(reply: Option<Reply<T>>, value: Result<T>) {
    if let Some(reply) = reply {
        let _ = reply.send(value);
    }
}

pub(crate) struct Worker {
    deps: CoordinatorDeps,
    navigator: TabNavigator,
    tx: mpsc::WeakUnboundedSender<Command>,
    /// Sequence number of the latest start / join / leave request.
    intent: u64,
    /// Sequence number of the explicit start still waiting for the backend.
    starting: Option<u64>,
    generation: u64,
    state: BindingState,
}

impl Worker {
    pub(crate) fn new(deps: CoordinatorDeps, tx: mpsc::WeakUnboundedSender<Command>) -> Self {
        let navigator = TabNavigator::new(deps.host.clone());
        Self {
            deps,
            navigator,
            tx,
            intent: 0,
            starting: None,
            generation: 0,
            state: BindingState::Unbound,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Shutdown { reply } => {
                    self.stop();
                    let _ = reply.send(());
                    return;
                }
                command => self.handle(command).await,
            }
        }
        self.stop();
    }

    fn stop(&mut self) {
        self.state.release(|| SyncError::CoordinatorStopped);
        info!("Party coordinator stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::StartParty { url, tab, reply } => self.start_party(url, tab, reply),
            Command::PartyStarted {
                playlist_id,
                admin,
                tab,
                reply,
            } => self.party_started(playlist_id, admin, tab, reply),
            Command::JoinParty {
                playlist_id,
                tab,
                reply,
            } => self.join_party(playlist_id, tab, reply),
            Command::LeaveParty { tab, reply } => self.leave_party(tab, reply).await,
            Command::TabClosed { tab } => self.tab_closed(tab).await,
            Command::TabLoaded { tab, url, active } => self.tab_loaded(tab, url, active).await,
            Command::Binding { reply } => {
                let _ = reply.send(self.state.view());
            }
            Command::Shutdown { .. } => {}
            Command::PartyReady {
                seq,
                tab,
                admin,
                result,
                reply,
            } => self.party_ready(seq, tab, admin, result, reply).await,
            Command::PartyJoined {
                seq,
                tab,
                result,
                reply,
            } => self.party_joined(seq, tab, result, reply).await,
            Command::SubscriptionOpened { generation, result } => {
                self.subscription_opened(generation, result)
            }
            Command::Snapshot {
                generation,
                playlist,
            } => self.snapshot(generation, playlist).await,
        }
    }

    fn next_intent(&mut self) -> u64 {
        self.intent += 1;
        self.starting = None;
        self.intent
    }

    fn start_party(&mut self, url: String, tab: TabId, reply: Reply<PlaylistId>) {
        let seq = self.next_intent();
        self.starting = Some(seq);
        info!(tab = %tab, url = %url, seq, "Starting party");

        let backend = self.deps.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.start_party(&url).await;
            post(
                &tx,
                Command::PartyReady {
                    seq,
                    tab,
                    admin: true,
                    result,
                    reply,
                },
            );
        });
    }

    fn party_started(&mut self, playlist_id: PlaylistId, admin: bool, tab: TabId, reply: Reply<PlaylistId>) {
        let seq = self.next_intent();
        self.starting = Some(seq);
        info!(tab = %tab, playlist = %playlist_id, seq, "Party started from popup");

        let backend = self.deps.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.playlist(&playlist_id).await;
            post(
                &tx,
                Command::PartyReady {
                    seq,
                    tab,
                    admin,
                    result,
                    reply,
                },
            );
        });
    }

    async fn party_ready(
        &mut self,
        seq: u64,
        tab: TabId,
        admin: bool,
        result: Result<Playlist>,
        reply: Reply<PlaylistId>,
    ) {
        if seq != self.intent {
            debug!(tab = %tab, seq, latest = self.intent, "Discarding superseded start");
            let _ = reply.send(Err(SyncError::Superseded));
            return;
        }
        self.starting = None;

        let playlist = match result {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!(tab = %tab, "Failed to start party: {}", e);
                let _ = reply.send(Err(e));
                return;
            }
        };

        let party = Party {
            playlist_id: playlist.id.clone(),
            user_id: self.deps.settings.user_id.clone(),
            is_admin: admin,
        };
        match self.deps.store.load().await {
            Ok(Some(old)) if old.playlist_id != party.playlist_id => self.abandon(old),
            Ok(_) => {}
            Err(e) => warn!("Failed to read persisted party: {}", e),
        }
        if let Err(e) = self.deps.store.save(&party).await {
            warn!(tab = %tab, playlist = %party.playlist_id, "Failed to persist party: {}", e);
            let _ = reply.send(Err(e));
            return;
        }

        // a new party replaces whatever was bound before
        self.state.release(|| SyncError::Superseded);
        self.bind(tab, playlist, PendingReply::Start(reply)).await;
    }

    /// Best-effort LeaveParty for a party replaced by a newly started one.
    fn abandon(&self, old: Party) {
        info!(playlist = %old.playlist_id, "Leaving previous party replaced by the new one");
        let backend = self.deps.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.leave_party(&old.playlist_id, &old.user_id).await {
                warn!(playlist = %old.playlist_id, "LeaveParty for replaced party failed: {}", e);
            }
        });
    }

    fn join_party(&mut self, playlist_id: PlaylistId, tab: TabId, reply: Option<Reply<JoinOutcome>>) {
        let seq = self.next_intent();
        info!(tab = %tab, playlist = %playlist_id, seq, "Joining party");

        let backend = self.deps.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = backend.join_party(&playlist_id).await;
            post(
                &tx,
                Command::PartyJoined {
                    seq,
                    tab,
                    result,
                    reply,
                },
            );
        });
    }

    async fn party_joined(
        &mut self,
        seq: u64,
        tab: TabId,
        result: Result<JoinedParty>,
        reply: Option<Reply<JoinOutcome>>,
    ) {
        if seq != self.intent {
            debug!(tab = %tab, seq, latest = self.intent, "Discarding superseded join");
            answer(reply, Err(SyncError::Superseded));
            return;
        }

        let joined = match result {
            Ok(joined) => joined,
            Err(e) => {
                warn!(tab = %tab, "Failed to join party: {}", e);
                answer(reply, Err(e));
                return;
            }
        };
        let playlist = joined.playlist;

        // rejoining our own party keeps the admin flag and identity
        let party = match self.deps.store.load().await {
            Ok(Some(existing)) if existing.playlist_id == playlist.id => existing,
            Ok(_) => Party {
                playlist_id: playlist.id.clone(),
                user_id: joined.user.id,
                is_admin: joined.admin,
            },
            Err(e) => {
                warn!("Failed to read persisted party: {}", e);
                Party {
                    playlist_id: playlist.id.clone(),
                    user_id: joined.user.id,
                    is_admin: joined.admin,
                }
            }
        };
        if let Err(e) = self.deps.store.save(&party).await {
            warn!(tab = %tab, playlist = %playlist.id, "Failed to persist party: {}", e);
            answer(reply, Err(e));
            return;
        }

        let same_playlist = self.state.playlist_id() == Some(&playlist.id);
        match self.state.tab() {
            None => self.bind(tab, playlist, PendingReply::Join(reply)).await,
            Some(bound) if same_playlist && bound == tab => {
                debug!(tab = %tab, playlist = %playlist.id, "Tab already bound, applying snapshot");
                self.apply_snapshot(playlist).await;
                answer(reply, Ok(JoinOutcome::Updated));
            }
            Some(bound) if same_playlist => {
                debug!(tab = %tab, bound = %bound, playlist = %playlist.id, "Party already bound to another tab");
                answer(reply, Ok(JoinOutcome::Observed));
            }
            Some(bound) => {
                info!(
                    tab = %tab,
                    previous_tab = %bound,
                    playlist = %playlist.id,
                    "Switching binding to newly joined party"
                );
                self.state.release(|| SyncError::Superseded);
                self.bind(tab, playlist, PendingReply::Join(reply)).await;
            }
        }
    }

    /// Reserves `tab`, moves it to the current track and opens the
    /// subscription. `reply` resolves when the subscription is open.
    async fn bind(&mut self, tab: TabId, playlist: Playlist, reply: PendingReply) {
        self.generation += 1;
        let generation = self.generation;
        let playlist_id = playlist.id.clone();

        self.navigator.navigate(tab, &playlist, true).await;
        self.state = BindingState::Opening {
            tab,
            playlist_id: playlist_id.clone(),
            generation,
            replies: vec![reply],
        };

        let snapshot_tx = self.tx.clone();
        let on_snapshot: SnapshotHandler = Arc::new(move |playlist: Playlist| {
            post(
                &snapshot_tx,
                Command::Snapshot {
                    generation,
                    playlist,
                },
            );
        });

        let channel = self.deps.channel.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = channel.open(&playlist_id, on_snapshot).await;
            post(&tx, Command::SubscriptionOpened { generation, result });
        });
    }

    fn subscription_opened(&mut self, generation: u64, result: Result<SubscriptionHandle>) {
        let current = matches!(
            &self.state,
            BindingState::Opening { generation: g, .. } if *g == generation
        );
        if !current {
            if let Ok(handle) = result {
                debug!(playlist = %handle.playlist_id(), generation, "Closing subscription of stale binding");
                handle.close();
            }
            return;
        }

        let BindingState::Opening {
            tab,
            playlist_id,
            generation,
            replies,
        } = std::mem::replace(&mut self.state, BindingState::Unbound)
        else {
            return;
        };

        match result {
            Ok(handle) => {
                info!(tab = %tab, playlist = %playlist_id, subscription = handle.id(), "Tab bound to party");
                self.state = BindingState::Bound {
                    tab,
                    playlist_id: playlist_id.clone(),
                    generation,
                    handle,
                };
                for reply in replies {
                    reply.succeed(&playlist_id);
                }
            }
            Err(e) => {
                warn!(tab = %tab, playlist = %playlist_id, "Failed to open subscription: {}", e);
                for reply in replies {
                    reply.fail(e.duplicate());
                }
            }
        }
    }

    async fn snapshot(&mut self, generation: u64, playlist: Playlist) {
        if self.state.generation() != Some(generation) || self.state.playlist_id() != Some(&playlist.id) {
            debug!(playlist = %playlist.id, generation, "Ignoring snapshot of stale binding");
            return;
        }
        self.apply_snapshot(playlist).await;
    }

    async fn apply_snapshot(&mut self, playlist: Playlist) {
        let Some(tab) = self.state.tab() else {
            return;
        };
        self.navigator.navigate(tab, &playlist, false).await;
    }

    async fn leave_party(&mut self, tab: Option<TabId>, reply: Option<Reply<LeaveOutcome>>) {
        let seq = self.next_intent();
        self.state.release(|| SyncError::Superseded);

        let party = match self.deps.store.load().await {
            Ok(party) => party,
            Err(e) => {
                warn!("Failed to read persisted party: {}", e);
                None
            }
        };
        if let Err(e) = self.deps.store.clear().await {
            warn!("Failed to clear persisted party: {}", e);
            answer(reply, Err(e));
            return;
        }

        let Some(party) = party else {
            debug!(tab = ?tab, seq, "Leave without party");
            answer(reply, Ok(LeaveOutcome::NoParty));
            return;
        };

        info!(tab = ?tab, playlist = %party.playlist_id, seq, "Leaving party");
        let backend = self.deps.backend.clone();
        tokio::spawn(async move {
            let result = backend
                .leave_party(&party.playlist_id, &party.user_id)
                .await
                .map(|()| LeaveOutcome::Left);
            if let Err(e) = &result {
                warn!(playlist = %party.playlist_id, "LeaveParty mutation failed: {}", e);
            }
            answer(reply, result);
        });
    }

    async fn tab_closed(&mut self, tab: TabId) {
        if self.state.tab() == Some(tab) {
            info!(tab = %tab, "Bound tab closed");
            self.state.release(|| SyncError::TabClosed(tab));
        }

        match self.deps.store.load().await {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read persisted party: {}", e);
                return;
            }
        }

        let fragment = &self.deps.settings.site_host_fragment;
        let site_still_open = self
            .deps
            .host
            .all_tabs()
            .await
            .iter()
            .any(|other| other.id != tab && matches_site(&other.url, fragment));
        if !site_still_open {
            info!("No party site tab left, leaving party");
            self.leave_party(None, None).await;
        }
    }

    async fn tab_loaded(&mut self, tab: TabId, url: String, active: bool) {
        if !active || !matches_site(&url, &self.deps.settings.site_host_fragment) {
            return;
        }
        if let Some(seq) = self.starting {
            debug!(tab = %tab, seq, "Party start in flight, not auto-joining");
            return;
        }

        let playlist_id = match party_id_from_url(&url) {
            Some(id) => Some(id),
            None => match self.deps.store.load().await {
                Ok(party) => party.map(|party| party.playlist_id),
                Err(e) => {
                    warn!("Failed to read persisted party: {}", e);
                    None
                }
            },
        };

        if let Some(playlist_id) = playlist_id {
            debug!(tab = %tab, playlist = %playlist_id, "Party site loaded, joining");
            self.join_party(playlist_id, tab, None);
        }
    }
}
