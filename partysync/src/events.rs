//! Typed callback registries for host notifications (tab lifecycle, media
//! playback).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    handlers: RwLock<HashMap<u64, Handler<E>>>,
    counter: AtomicU64,
    closed: AtomicBool,
}

/// A source of events of type `E`.
///
/// Handlers run synchronously on the emitting thread, in no particular order.
/// Cloning shares the registry.
pub struct EventSource<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for EventSource<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E> Default for EventSource<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("handlers", &self.handler_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E> EventSource<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: RwLock::new(HashMap::new()),
                counter: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a handler. Subscribing to a closed source is a no-op and the
    /// returned token is inert.
    pub fn subscribe<F>(&self, handler: F) -> UnsubscribeToken
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: 'static,
    {
        let id = self.registry.counter.fetch_add(1, Ordering::Relaxed);
        if !self.is_closed() {
            self.registry
                .handlers
                .write()
                .unwrap()
                .insert(id, Arc::new(handler));
        }

        let weak: Weak<Registry<E>> = Arc::downgrade(&self.registry);
        UnsubscribeToken {
            id,
            remove: Some(Box::new(move |id| {
                if let Some(registry) = weak.upgrade() {
                    registry.handlers.write().unwrap().remove(&id);
                }
            })),
        }
    }

    /// Delivers `event` to every registered handler.
    pub fn emit(&self, event: &E) {
        // Snapshot des handlers : un handler peut se désabonner pendant l'appel
        let handlers: Vec<Handler<E>> = self
            .registry
            .handlers
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Drops every handler and refuses new ones.
    pub fn close(&self) {
        self.registry.closed.store(true, Ordering::SeqCst);
        self.registry.handlers.write().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.registry.closed.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.registry.handlers.read().unwrap().len()
    }
}

/// Returned by [`EventSource::subscribe`]; removes the handler when
/// [`unsubscribe`](Self::unsubscribe) is called.
///
/// Dropping the token leaves the handler registered.
pub struct UnsubscribeToken {
    id: u64,
    remove: Option<Box<dyn FnOnce(u64) + Send + Sync>>,
}

impl UnsubscribeToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove(self.id);
        }
    }
}

impl fmt::Debug for UnsubscribeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeToken").field("id", &self.id).finish()
    }
}
