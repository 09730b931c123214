//! Subscriber Registry Module
//!
//! Tracks callbacks registered per key, in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::manager::AnyValue;

/// Identifies one registered callback.
pub type SubscriberId = u64;

/// Type-erased subscriber callback.
pub(crate) type Callback = Arc<dyn Fn(&AnyValue) + Send + Sync>;

// == Subscriber Registry ==
/// Maps keys to their subscriber sets.
///
/// A key is present only while it has at least one subscriber.
#[derive(Default)]
pub struct SubscriberRegistry {
    sets: HashMap<String, Vec<(SubscriberId, Callback)>>,
    next_id: SubscriberId,
}

impl SubscriberRegistry {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Add ==
    /// Registers `callback` for `key` and returns its id.
    pub(crate) fn add(&mut self, key: &str, callback: Callback) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        self.sets
            .entry(key.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    // == Remove ==
    /// Removes subscriber `id` from `key`.
    ///
    /// Returns true when this removal emptied the key's set.
    pub fn remove(&mut self, key: &str, id: SubscriberId) -> bool {
        let Some(set) = self.sets.get_mut(key) else {
            return false;
        };

        let before = set.len();
        set.retain(|(existing, _)| *existing != id);
        if set.len() == before {
            return false;
        }

        if set.is_empty() {
            self.sets.remove(key);
            return true;
        }
        false
    }

    // == Callbacks ==
    /// Snapshot of the callbacks for `key`, in registration order.
    pub(crate) fn callbacks(&self, key: &str) -> Vec<Callback> {
        self.sets
            .get(key)
            .map(|set| set.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    /// Number of subscribers of `key`.
    pub fn count(&self, key: &str) -> usize {
        self.sets.get(key).map_or(0, Vec::len)
    }

    /// Number of keys with at least one subscriber.
    pub fn key_count(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drops every subscriber set.
    pub fn clear(&mut self) {
        self.sets.clear();
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .sets
            .iter()
            .map(|(key, set)| (key.as_str(), set.len()))
            .collect();
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &counts)
            .finish()
    }
}
