//! Copy-on-write listener set
//!
//! Writers replace the whole list; readers take a snapshot `Arc` and iterate
//! it without holding any lock, so adding or removing a listener never
//! disturbs a fan-out already in progress.

use std::sync::Arc;

use parking_lot::RwLock;

use super::pipe::StreamListener;

/// Set of stream listeners, keyed by identity
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Arc<Vec<Arc<dyn StreamListener>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; returns `false` if it is already present
    pub fn add(&self, listener: Arc<dyn StreamListener>) -> bool {
        let mut guard = self.listeners.write();
        if guard.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        true
    }

    /// Remove a listener; returns `false` if it was not present
    pub fn remove(&self, listener: &Arc<dyn StreamListener>) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|l| same_listener(l, listener)) {
            return false;
        }
        let next: Vec<_> = guard
            .iter()
            .filter(|l| !same_listener(l, listener))
            .cloned()
            .collect();
        *guard = Arc::new(next);
        true
    }

    /// Current listeners, stable for as long as the snapshot is held
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn StreamListener>>> {
        Arc::clone(&self.listeners.read())
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.listeners.write() = Arc::new(Vec::new());
    }
}

fn same_listener(a: &Arc<dyn StreamListener>, b: &Arc<dyn StreamListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}
