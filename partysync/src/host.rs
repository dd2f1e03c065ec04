//! Browser host seam: tabs, their locations and lifecycle events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::{Result, SyncError};
use crate::events::EventSource;
use crate::memory_backend::PARTY_ID_PARAM;
use crate::model::PlaylistId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
    pub active: bool,
}

/// Lifecycle notifications emitted by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A tab finished loading `url`.
    TabLoaded { tab: TabId, url: String, active: bool },
    TabClosed { tab: TabId },
}

#[async_trait]
pub trait TabHost: Send + Sync {
    /// Returns `None` once the tab is closed.
    async fn tab(&self, id: TabId) -> Option<TabInfo>;

    /// Tabs whose location is exactly `url`.
    async fn tabs_with_url(&self, url: &str) -> Vec<TabInfo>;

    async fn all_tabs(&self) -> Vec<TabInfo>;

    /// The focused tab of the current window.
    async fn active_tab(&self) -> Option<TabInfo>;

    async fn navigate(&self, id: TabId, url: &str) -> Result<()>;
}

/// True when `url` points at the party site, i.e. its host contains
/// `host_fragment`.
pub fn matches_site(url: &str, host_fragment: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.contains(host_fragment)))
        .unwrap_or(false)
}

/// Party id carried by an invitation link, if any.
pub fn party_id_from_url(url: &str) -> Option<PlaylistId> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, value)| key == PARTY_ID_PARAM && !value.is_empty())
        .map(|(_, value)| PlaylistId::new(value.into_owned()))
}

#[derive(Default)]
struct HostState {
    tabs: BTreeMap<TabId, TabInfo>,
    next_id: u64,
    navigations: Vec<(TabId, String)>,
}

/// In-memory browser: a set of tabs plus an event source.
///
/// Navigation only updates the stored location; [`MemoryTabHost::load`]
/// emits the matching `TabLoaded` event when a test wants one.
#[derive(Clone, Default)]
pub struct MemoryTabHost {
    state: Arc<Mutex<HostState>>,
    events: EventSource<HostEvent>,
}

impl MemoryTabHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> EventSource<HostEvent> {
        self.events.clone()
    }

    /// Opens a tab without emitting any event.
    pub fn open_tab(&self, url: &str, active: bool) -> TabId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = TabId(state.next_id);
        if active {
            for tab in state.tabs.values_mut() {
                tab.active = false;
            }
        }
        state.tabs.insert(
            id,
            TabInfo {
                id,
                url: url.to_string(),
                active,
            },
        );
        id
    }

    /// Loads `url` in an existing tab and emits `TabLoaded`.
    pub fn load(&self, id: TabId, url: &str) {
        let active = {
            let mut state = self.state.lock().unwrap();
            match state.tabs.get_mut(&id) {
                Some(tab) => {
                    tab.url = url.to_string();
                    tab.active
                }
                None => return,
            }
        };
        self.events.emit(&HostEvent::TabLoaded {
            tab: id,
            url: url.to_string(),
            active,
        });
    }

    /// Closes a tab and emits `TabClosed`.
    pub fn close_tab(&self, id: TabId) {
        let removed = self.state.lock().unwrap().tabs.remove(&id).is_some();
        if removed {
            self.events.emit(&HostEvent::TabClosed { tab: id });
        }
    }

    pub fn activate(&self, id: TabId) {
        let mut state = self.state.lock().unwrap();
        for tab in state.tabs.values_mut() {
            tab.active = tab.id == id;
        }
    }

    /// Every navigation performed through [`TabHost::navigate`], in order.
    pub fn navigations(&self) -> Vec<(TabId, String)> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn location(&self, id: TabId) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .tabs
            .get(&id)
            .map(|tab| tab.url.clone())
    }
}

#[async_trait]
impl TabHost for MemoryTabHost {
    async fn tab(&self, id: TabId) -> Option<TabInfo> {
        self.state.lock().unwrap().tabs.get(&id).cloned()
    }

    async fn tabs_with_url(&self, url: &str) -> Vec<TabInfo> {
        self.state
            .lock()
            .unwrap()
            .tabs
            .values()
            .filter(|tab| tab.url == url)
            .cloned()
            .collect()
    }

    async fn all_tabs(&self) -> Vec<TabInfo> {
        self.state.lock().unwrap().tabs.values().cloned().collect()
    }

    async fn active_tab(&self) -> Option<TabInfo> {
        self.state
            .lock()
            .unwrap()
            .tabs
            .values()
            .find(|tab| tab.active)
            .cloned()
    }

    async fn navigate(&self, id: TabId, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let tab = state.tabs.get_mut(&id).ok_or(SyncError::TabClosed(id))?;
        tab.url = url.to_string();
        state.navigations.push((id, url.to_string()));
        debug!(tab = %id, url, "Tab navigated");
        Ok(())
    }
}
