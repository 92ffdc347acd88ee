//! Keyed async locks serialising mutations of a single record

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One lock per record key, created on demand and dropped once nobody holds
/// or waits on it.
#[derive(Debug)]
pub struct RecordLocks<K> {
    entries: Arc<Mutex<HashMap<K, Weak<Mutex<()>>>>>,
}

impl<K> Clone for RecordLocks<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K: Eq + Hash> Default for RecordLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> RecordLocks<K> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let record = {
            let mut entries = self.entries.lock().await;
            entries.retain(|_, weak| weak.strong_count() > 0);
            match entries.get(&key).and_then(Weak::upgrade) {
                Some(record) => record,
                None => {
                    let record = Arc::new(Mutex::new(()));
                    entries.insert(key, Arc::downgrade(&record));
                    record
                }
            }
        };
        record.lock_owned().await
    }

    /// Number of keys currently held or awaited
    pub async fn active(&self) -> usize {
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
