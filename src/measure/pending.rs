//! Correlation of in-flight probes with their replies.
//!
//! The engine inserts an entry before a probe is sent; whichever of reply,
//! send failure, timeout or cancellation arrives first removes it. Removal is
//! the only way to resolve a probe, so a sequence number resolves exactly once.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use tokio_util::sync::CancellationToken;

use crate::measure::timer::RoundTripTimer;

/// A probe that has been sent and is awaiting a response
#[derive(Debug, Clone)]
pub struct PendingProbe {
    /// Position of the probe in the batch schedule
    pub slot: usize,
    pub timer: RoundTripTimer,
    /// Cancels the armed timeout for this probe
    pub timeout: CancellationToken,
}

/// Thread-safe map with atomic insert, remove and snapshot.
#[derive(Debug)]
pub struct CorrelationStore<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

/// Store of pending probes keyed by echo sequence number
pub type PendingMap = CorrelationStore<u16, PendingProbe>;

impl<K: Eq + Hash, V> Default for CorrelationStore<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V> CorrelationStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the number of entries afterwards
    pub fn insert(&self, key: K, value: V) -> usize {
        let mut entries = self.entries.lock();
        entries.insert(key, value);
        entries.len()
    }

    /// Remove an entry. `None` means another caller already removed it.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key)
    }

    /// Remove and return every entry
    pub fn drain(&self) -> Vec<V> {
        self.entries.lock().drain().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> CorrelationStore<K, V> {
    /// Snapshot of all values, in no particular order
    pub fn values(&self) -> Vec<V> {
        self.entries.lock().values().cloned().collect()
    }
}
