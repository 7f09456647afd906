use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Inner<E> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<E>)>,
}

/// Synchronous listener list. Callbacks run in subscription order, outside the lock.
pub struct ObserverList<E> {
    inner: Arc<Mutex<Inner<E>>>,
}

impl<E> Clone for ObserverList<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for ObserverList<E> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }
}

impl<E> std::fmt::Debug for ObserverList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}

impl<E: 'static> ObserverList<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`. It stays registered until the returned handle drops.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
        E: Send,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.callbacks.push((id, Arc::new(callback)));
            id
        };
        let owner: Arc<dyn Unsubscribe + Send + Sync> = self.inner.clone();
        Subscription {
            owner: Arc::downgrade(&owner),
            id,
        }
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .inner
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().callbacks.clear();
    }
}

impl<E> ObserverList<E> {
    pub fn len(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

trait Unsubscribe {
    fn unsubscribe(&self, id: u64);
}

impl<E> Unsubscribe for Mutex<Inner<E>> {
    fn unsubscribe(&self, id: u64) {
        self.lock().callbacks.retain(|(cid, _)| *cid != id);
    }
}

/// Handle returned by `ObserverList::subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    owner: Weak<dyn Unsubscribe + Send + Sync>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the callback registered for the lifetime of the list.
    pub fn detach(mut self) {
        self.owner = Weak::<Mutex<Inner<()>>>::new();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.unsubscribe(self.id);
        }
    }
}
