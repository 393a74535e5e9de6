//! ---
//! mfe_section: "02-shared-state"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Observable key-value store for host and micro-app communication."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
//! Global state store shared by the host page and mounted micro-apps.
//!
//! Every [`GlobalStateStore::set`] notifies the subscribers of that key
//! synchronously, in subscription order, with `(new, old)`. Callbacks run
//! outside the store lock, so they may read or write other keys; writing the
//! key that is currently being notified recurses and is not supported.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

type Callback = Arc<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct StoreInner {
    state: HashMap<String, Value>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    next_id: u64,
}

/// Observable key-value store. Cloning yields another handle to the same state.
#[derive(Clone, Default)]
pub struct GlobalStateStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl fmt::Debug for GlobalStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("GlobalStateStore")
            .field("keys", &inner.state.len())
            .field("subscribed_keys", &inner.subscribers.len())
            .finish()
    }
}

impl GlobalStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store by calling [`set`](Self::set) for every entry in order.
    pub fn init<I, K>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Overwrite `key` and notify its subscribers, even when the value is unchanged.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let (previous, callbacks) = {
            let mut inner = self.inner.lock();
            let previous = inner.state.insert(key.clone(), value.clone());
            let callbacks: Vec<Callback> = inner
                .subscribers
                .get(&key)
                .map(|subs| subs.iter().map(|sub| sub.callback.clone()).collect())
                .unwrap_or_default();
            (previous, callbacks)
        };
        trace!(key = %key, subscribers = callbacks.len(), "global state updated");
        for callback in callbacks {
            callback(&value, previous.as_ref());
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().state.get(key).cloned()
    }

    /// Register `callback` for changes to `key`.
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Unsubscribe
    where
        F: Fn(&Value, Option<&Value>) + Send + Sync + 'static,
    {
        let key = key.into();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        Unsubscribe {
            key,
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live registrations for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(key)
            .map_or(0, |subs| subs.len())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().state.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Revocation handle for a single subscription.
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it. Repeated calls are no-ops.
#[derive(Debug)]
pub struct Unsubscribe {
    key: String,
    id: u64,
    store: Weak<Mutex<StoreInner>>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        if let Some(subs) = inner.subscribers.get_mut(&self.key) {
            subs.retain(|sub| sub.id != self.id);
            if subs.is_empty() {
                inner.subscribers.remove(&self.key);
            }
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

static GLOBAL: Lazy<GlobalStateStore> = Lazy::new(GlobalStateStore::new);

/// Process-wide store used by the free functions below.
pub fn global() -> &'static GlobalStateStore {
    &GLOBAL
}

pub fn set_global_state(key: impl Into<String>, value: Value) {
    global().set(key, value);
}

pub fn get_global_state(key: &str) -> Option<Value> {
    global().get(key)
}

pub fn on_global_state_change<F>(key: impl Into<String>, callback: F) -> Unsubscribe
where
    F: Fn(&Value, Option<&Value>) + Send + Sync + 'static,
{
    global().subscribe(key, callback)
}

pub fn init_global_state<I, K>(entries: I)
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    global().init(entries);
}
