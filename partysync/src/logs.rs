//! Logging setup: `tracing` registry with a reloadable level filter, an
//! in-memory ring buffer of recent entries and an optional console layer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, Registry};

const LIVE_FEED_CAPACITY: usize = 1000;

/// Represents a log entry
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Shared ring buffer of recent entries plus a live feed.
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    max_level: Arc<RwLock<Level>>,
    reload_handle: Option<reload::Handle<LevelFilter, Registry>>,
}

impl LogState {
    pub fn new(capacity: usize, reload_handle: Option<reload::Handle<LevelFilter, Registry>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx: broadcast::channel(LIVE_FEED_CAPACITY).0,
            max_level: Arc::new(RwLock::new(Level::TRACE)),
            reload_handle,
        }
    }

    /// Changes the global level filter at runtime.
    pub fn set_max_level(&self, level: Level) {
        *self.max_level.write().unwrap() = level;

        if let Some(handle) = &self.reload_handle {
            if let Err(e) = handle.reload(LevelFilter::from_level(level)) {
                eprintln!("Failed to reload log level filter: {}", e);
            }
        }
    }

    pub fn get_max_level(&self) -> Level {
        *self.max_level.read().unwrap()
    }

    fn push(&self, entry: LogEntry) {
        let mut buf = self.buffer.write().unwrap();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(entry.clone());
        let _ = self.tx.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        self.buffer.read().unwrap().iter().cloned().collect()
    }
}

/// Layer feeding every event into a [`LogState`].
pub struct BufferLayer {
    state: LogState,
}

impl BufferLayer {
    pub fn new(state: LogState) -> Self {
        Self { state }
    }
}

#[derive(Default)]
struct EntryVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl EntryVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        self.state.push(LogEntry {
            timestamp: SystemTime::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.into_message(),
        });
    }
}

/// Logging initialization options
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Number of entries kept in the ring buffer
    pub buffer_capacity: usize,
    /// Also write to the console
    pub enable_console: bool,
    pub min_level: Level,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 500,
            enable_console: true,
            min_level: Level::INFO,
        }
    }
}

impl LoggingOptions {
    #[cfg(feature = "partyconfig")]
    pub fn from_config() -> Self {
        use crate::config_ext::PartySyncConfigExt;

        partyconfig::get_config().logging_options()
    }
}

/// Installs the global subscriber and returns the shared [`LogState`].
///
/// If a global subscriber is already installed (tests, embedding
/// application) the existing one is kept and the returned state only sees
/// what is pushed to it explicitly.
///
/// ```rust,no_run
/// use partysync::logs::{init_logging, LoggingOptions};
///
/// let log_state = init_logging(LoggingOptions::default());
/// let recent = log_state.dump();
/// ```
pub fn init_logging(options: LoggingOptions) -> LogState {
    let (filter, reload_handle) = reload::Layer::new(LevelFilter::from_level(options.min_level));
    let log_state = LogState::new(options.buffer_capacity, Some(reload_handle));
    *log_state.max_level.write().unwrap() = options.min_level;

    // the filter comes first so the buffer only sees enabled events
    let subscriber = Registry::default()
        .with(filter)
        .with(BufferLayer::new(log_state.clone()));

    let installed = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if installed.is_err() {
        eprintln!("A global tracing subscriber is already installed, keeping it");
    }

    log_state
}

/// Parses `ERROR`, `WARN`, `INFO`, `DEBUG` or `TRACE`, in any case.
pub fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_keeps_most_recent_entries() {
        let state = LogState::new(2, None);
        let subscriber = Registry::default().with(BufferLayer::new(state.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("first");
            tracing::warn!(tab = 3, "second");
            tracing::error!("third");
        });

        let entries = state.dump();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, "WARN");
        assert_eq!(entries[0].message, "second tab=3");
        assert_eq!(entries[1].message, "third");
    }

    #[test]
    fn test_live_feed_receives_entries() {
        let state = LogState::new(10, None);
        let mut rx = state.subscribe();
        let subscriber = Registry::default().with(BufferLayer::new(state.clone()));

        tracing::subscriber::with_default(subscriber, || tracing::debug!("hello"));

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.level, "DEBUG");
    }

    #[test]
    fn test_string_to_level() {
        assert_eq!(string_to_level("info"), Some(Level::INFO));
        assert_eq!(string_to_level(" Warn "), Some(Level::WARN));
        assert_eq!(string_to_level("loud"), None);
    }

    #[test]
    fn test_set_max_level_without_handle() {
        let state = LogState::new(1, None);
        state.set_max_level(Level::DEBUG);
        assert_eq!(state.get_max_level(), Level::DEBUG);
    }
}
