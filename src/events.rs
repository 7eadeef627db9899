//! Minimal typed publish-subscribe.
//!
//! Handlers run synchronously on the publishing thread in subscription order. There is no
//! replay: a handler registered after an event fired never observes it. An emitter can be
//! piped into other emitters so a composed object re-broadcasts what it receives.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct EmitterInner<K, P> {
    listeners: Mutex<HashMap<K, Vec<(u64, Handler<P>)>>>,
    piped: Mutex<Vec<(u64, EventEmitter<K, P>)>>,
    next_id: AtomicU64,
}

impl<K, P> EmitterInner<K, P> {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Publish-subscribe hub keyed by event name `K`, delivering payloads of type `P`.
pub struct EventEmitter<K, P> {
    inner: Arc<EmitterInner<K, P>>,
}

impl<K, P> Clone for EventEmitter<K, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, P> Default for EventEmitter<K, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    P: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> EventEmitter<K, P>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    P: 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                listeners: Mutex::new(HashMap::new()),
                piped: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register `handler` for events named `key`.
    pub fn subscribe<F>(&self, key: K, handler: F) -> Unsubscribe
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        self.inner
            .listeners
            .lock()
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        let weak: Weak<EmitterInner<K, P>> = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Some(handlers) = inner.listeners.lock().get_mut(&key) {
                    handlers.retain(|(handler_id, _)| *handler_id != id);
                }
            }
        })
    }

    /// Drop every handler registered for `key`.
    pub fn clear(&self, key: &K) {
        self.inner.listeners.lock().remove(key);
    }

    /// Invoke all current handlers for `key`, then forward to piped emitters.
    pub fn publish(&self, key: &K, payload: &P) {
        // Snapshot so handlers may subscribe or unsubscribe while being called.
        let handlers: Vec<Handler<P>> = self
            .inner
            .listeners
            .lock()
            .get(key)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(payload);
        }

        let piped: Vec<EventEmitter<K, P>> = self
            .inner
            .piped
            .lock()
            .iter()
            .map(|(_, emitter)| emitter.clone())
            .collect();
        for emitter in piped {
            emitter.publish(key, payload);
        }
    }

    /// Re-broadcast everything published here on `target` as well. Pipes must not form a cycle.
    pub fn pipe(&self, target: &EventEmitter<K, P>) -> Unsubscribe {
        let id = self.inner.next_id();
        self.inner.piped.lock().push((id, target.clone()));

        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.piped.lock().retain(|(pipe_id, _)| *pipe_id != id);
            }
        })
    }

    pub fn listener_count(&self, key: &K) -> usize {
        self.inner
            .listeners
            .lock()
            .get(key)
            .map_or(0, Vec::len)
    }
}

/// Handle returned by [`EventEmitter::subscribe`] and [`EventEmitter::pipe`].
///
/// Dropping the handle keeps the subscription alive; call [`Unsubscribe::unsubscribe`]
/// to remove it.
#[must_use = "dropping the handle leaves the subscription registered"]
pub struct Unsubscribe {
    action: Box<dyn FnOnce() + Send>,
}

impl Unsubscribe {
    fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Box::new(action),
        }
    }

    pub fn unsubscribe(self) {
        (self.action)();
    }
}
