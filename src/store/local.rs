//! One node's partition: the map, its lock, and the put notification.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::key::Key;
use super::map::LocalMap;

/// The locally-owned partition of the key space. Exactly one mutex guards
/// the map; every put bumps a version watched by blocking readers, who
/// re-check the map on each wakeup (the notification is a broadcast for
/// every put, not a targeted wake).
pub struct LocalStore {
    map: Mutex<LocalMap>,
    put_version: watch::Sender<u64>,
    purged: AtomicBool,
}

impl LocalStore {
    pub fn new() -> Self {
        let (put_version, _) = watch::channel(0);
        Self {
            map: Mutex::new(LocalMap::new()),
            put_version,
            purged: AtomicBool::new(false),
        }
    }

    /// Inserts under the lock, then wakes every blocked reader.
    pub fn put(&self, key: Key, value: String) {
        self.map.lock().put(key, value);
        self.put_version.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub fn get(&self, key: &Key) -> Option<String> {
        self.map.lock().get(key).map(str::to_owned)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.map.lock().contains(key)
    }

    pub fn remove(&self, key: &Key) -> Option<String> {
        self.map.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Blocks until the key is present, then returns its value. Waits
    /// unconditionally: an unmet key blocks until the matching put or the
    /// end of the cluster run.
    pub async fn wait_for(&self, key: &Key) -> Result<String> {
        let mut version = self.put_version.subscribe();
        loop {
            if let Some(value) = self.get(key) {
                return Ok(value);
            }
            if version.changed().await.is_err() {
                bail!("store dropped while waiting for key {key}");
            }
        }
    }

    /// Frees this node's entries. Idempotent: only the first call clears.
    pub fn purge(&self) {
        if !self.purged.swap(true, Ordering::SeqCst) {
            self.map.lock().clear();
        }
    }

    pub fn purged(&self) -> bool {
        self.purged.load(Ordering::SeqCst)
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}
