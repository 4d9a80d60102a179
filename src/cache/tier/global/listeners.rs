//! Change-listener registry
//!
//! A copy-on-write snapshot list: registration and deregistration swap a
//! fresh list in place, so fan-out iterates a stable snapshot without
//! taking any lock.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cache::traits::CacheChangeListener;

/// Lock-free registry of change listeners
pub struct ListenerRegistry<V: 'static> {
    listeners: ArcSwap<Vec<Arc<dyn CacheChangeListener<V>>>>,
}

impl<V: 'static> Default for ListenerRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: 'static> ListenerRegistry<V> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Add a listener
    pub fn register(&self, listener: Arc<dyn CacheChangeListener<V>>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Remove a previously registered listener (matched by identity)
    pub fn deregister(&self, listener: &Arc<dyn CacheChangeListener<V>>) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|existing| !Arc::ptr_eq(existing, listener))
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    /// Stable snapshot for iteration
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn CacheChangeListener<V>>>> {
        self.listeners.load_full()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    /// Whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingListener {
        deletes: AtomicUsize,
    }

    impl CacheChangeListener<u32> for CountingListener {
        fn on_insert(&self, _key: &str, _new_value: u32) {}
        fn on_update(&self, _key: &str, _old_value: Option<u32>, _new_value: u32) {}
        fn on_delete(&self, _key: &str) {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn register_and_deregister_by_identity() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let counting = Arc::new(CountingListener::default());
        let listener: Arc<dyn CacheChangeListener<u32>> = counting.clone();

        registry.register(Arc::clone(&listener));
        assert_eq!(registry.len(), 1);

        for entry in registry.snapshot().iter() {
            entry.on_delete("k");
        }
        assert_eq!(counting.deletes.load(Ordering::Relaxed), 1);

        registry.deregister(&listener);
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_stable_across_mutation() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let listener: Arc<dyn CacheChangeListener<u32>> =
            Arc::new(CountingListener::default());
        registry.register(Arc::clone(&listener));

        let snapshot = registry.snapshot();
        registry.deregister(&listener);
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }
}
