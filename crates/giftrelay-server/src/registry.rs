//! The live set of downstream subscribers.
//!
//! Every operation takes the same mutex, so adds, removes, clears and
//! snapshots are serialized against each other. A snapshot is a copy: later
//! mutations never change a snapshot already taken.

use std::sync::Arc;

use giftrelay_core::{RelayError, SubscriberId};
use metrics::gauge;
use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::WS_CONNECTIONS_ACTIVE;
use crate::subscriber::Subscriber;

/// Registered subscribers in insertion order.
pub struct SubscriberRegistry {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    capacity: usize,
}

impl SubscriberRegistry {
    /// Create a registry that holds at most `capacity` subscribers.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Register a subscriber.
    ///
    /// A subscriber whose id is already present replaces the old entry in
    /// place. New ids beyond capacity are refused with
    /// [`RelayError::RegistryFull`].
    pub fn add(&self, subscriber: Arc<Subscriber>) -> Result<(), RelayError> {
        let mut subs = self.subscribers.lock();
        if let Some(slot) = subs.iter_mut().find(|s| s.id() == subscriber.id()) {
            *slot = subscriber;
            return Ok(());
        }
        if subs.len() >= self.capacity {
            return Err(RelayError::RegistryFull {
                capacity: self.capacity,
            });
        }
        debug!(subscriber_id = %subscriber.id(), "subscriber registered");
        subs.push(subscriber);
        record_active(subs.len());
        Ok(())
    }

    /// Unregister a subscriber. Absent ids are a no-op.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id() != id);
        let removed = subs.len() != before;
        if removed {
            record_active(subs.len());
        }
        removed
    }

    /// Unregister several subscribers under one lock.
    ///
    /// Returns how many were present.
    pub fn remove_many(&self, ids: &[SubscriberId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| !ids.contains(s.id()));
        let removed = before - subs.len();
        if removed > 0 {
            record_active(subs.len());
        }
        removed
    }

    /// Point-in-time copy of the registered subscribers.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.lock().clone()
    }

    /// Remove everyone, returning who was registered.
    pub fn clear(&self) -> Vec<Arc<Subscriber>> {
        let drained = std::mem::take(&mut *self.subscribers.lock());
        record_active(0);
        drained
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|s| s.id() == id)
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Maximum number of subscribers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(count: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sub(id: &str) -> Arc<Subscriber> {
        let (sub, _rx) = Subscriber::channel(SubscriberId::from_string(id.into()), 4);
        sub
    }

    fn ids(subs: &[Arc<Subscriber>]) -> Vec<String> {
        subs.iter().map(|s| s.id().to_string()).collect()
    }

    #[test]
    fn add_and_snapshot_in_insertion_order() {
        let registry = SubscriberRegistry::new(10);
        for id in ["a", "b", "c"] {
            registry.add(sub(id)).unwrap();
        }
        assert_eq!(ids(&registry.snapshot()), vec!["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn remove_absent_is_noop() {
        let registry = SubscriberRegistry::new(10);
        registry.add(sub("a")).unwrap();
        assert!(!registry.remove(&SubscriberId::from_string("zzz".into())));
        assert!(registry.remove(&SubscriberId::from_string("a".into())));
        assert!(!registry.remove(&SubscriberId::from_string("a".into())));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let registry = SubscriberRegistry::new(10);
        registry.add(sub("a")).unwrap();
        registry.add(sub("b")).unwrap();
        let snapshot = registry.snapshot();

        let _ = registry.remove(&SubscriberId::from_string("a".into()));
        registry.add(sub("c")).unwrap();

        assert_eq!(ids(&snapshot), vec!["a", "b"]);
        assert_eq!(ids(&registry.snapshot()), vec!["b", "c"]);
    }

    #[test]
    fn capacity_is_enforced() {
        let registry = SubscriberRegistry::new(2);
        registry.add(sub("a")).unwrap();
        registry.add(sub("b")).unwrap();
        assert_matches!(
            registry.add(sub("c")),
            Err(RelayError::RegistryFull { capacity: 2 })
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn same_id_replaces_in_place() {
        let registry = SubscriberRegistry::new(2);
        registry.add(sub("a")).unwrap();
        registry.add(sub("b")).unwrap();
        let replacement = sub("a");
        registry.add(Arc::clone(&replacement)).unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(ids(&snapshot), vec!["a", "b"]);
        assert!(Arc::ptr_eq(&snapshot[0], &replacement));
    }

    #[test]
    fn remove_many_counts_present_only() {
        let registry = SubscriberRegistry::new(10);
        for id in ["a", "b", "c", "d"] {
            registry.add(sub(id)).unwrap();
        }
        let removed = registry.remove_many(&[
            SubscriberId::from_string("b".into()),
            SubscriberId::from_string("d".into()),
            SubscriberId::from_string("x".into()),
        ]);
        assert_eq!(removed, 2);
        assert_eq!(ids(&registry.snapshot()), vec!["a", "c"]);
        assert_eq!(registry.remove_many(&[]), 0);
    }

    #[test]
    fn clear_drains_everything() {
        let registry = SubscriberRegistry::new(10);
        registry.add(sub("a")).unwrap();
        registry.add(sub("b")).unwrap();
        let drained = registry.clear();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.clear().is_empty());
    }

    #[test]
    fn concurrent_adds_and_removes_stay_consistent() {
        let registry = Arc::new(SubscriberRegistry::new(1_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("t{t}_{i}");
                        registry.add(sub(&id)).unwrap();
                        if i % 2 == 0 {
                            assert!(registry.remove(&SubscriberId::from_string(id)));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 8 * 25);
        assert!(registry.contains(&SubscriberId::from_string("t0_1".into())));
    }
}
