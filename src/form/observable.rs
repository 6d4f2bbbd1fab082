use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, Weak};

use super::error::{read_recover, write_recover};

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerSet<E> {
    next_id: u64,
    closed: bool,
    listeners: BTreeMap<u64, Listener<E>>,
}

/// Ordered listener list. Listeners run in subscription order, outside of the
/// internal lock, so a listener may subscribe, unsubscribe or notify again.
pub struct Notifier<E = ()> {
    inner: Arc<RwLock<ListenerSet<E>>>,
}

impl<E> Clone for Notifier<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: 'static> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Notifier<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ListenerSet {
                next_id: 0,
                closed: false,
                listeners: BTreeMap::new(),
            })),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let mut set = write_recover(&self.inner);
        if set.closed {
            return Subscription::inert();
        }
        let id = set.next_id;
        set.next_id += 1;
        set.listeners.insert(id, Arc::new(listener));

        let weak: Weak<RwLock<ListenerSet<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    write_recover(&inner).listeners.remove(&id);
                }
            })),
        }
    }

    pub fn emit(&self, event: &E) {
        let listeners = {
            let set = read_recover(&self.inner);
            if set.closed {
                return;
            }
            set.listeners.values().cloned().collect::<Vec<_>>()
        };
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        read_recover(&self.inner).listeners.len()
    }

    /// Drops every listener and refuses new ones.
    pub fn close(&self) {
        let mut set = write_recover(&self.inner);
        set.closed = true;
        set.listeners.clear();
    }

    pub fn is_closed(&self) -> bool {
        read_recover(&self.inner).closed
    }
}

impl Notifier<()> {
    pub fn notify(&self) {
        self.emit(&());
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the listener attached;
/// call `unsubscribe` to detach.
#[must_use = "dropping a subscription does not detach the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn inert() -> Self {
        Self { cancel: None }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Rebuild contract between a controller and the UI layer.
pub trait Observable {
    fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription;

    fn notify(&self);

    fn listener_count(&self) -> usize;
}
