//! Open-addressing hash table for one node's partition.
//!
//! Values are stored as opaque serialized text; the map never inspects
//! them. Removal marks a tombstone instead of compacting; a tombstoned slot
//! is reclaimed when a later insertion probes onto it, and growth rehashes
//! only the live entries.

use super::key::Key;

const INITIAL_CAPACITY: usize = 4;

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    /// Logically removed; the slot is reused by a later insert.
    Tombstone,
    Live { key: Key, value: String },
}

/// Key -> value text map with linear-probe insertion and tombstone
/// deletion. Capacity doubles before the load factor would pass 1/2.
#[derive(Debug)]
pub struct LocalMap {
    slots: Vec<Slot>,
    live: usize,
}

impl LocalMap {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::Empty; INITIAL_CAPACITY],
            live: 0,
        }
    }

    /// Number of live (non-tombstoned) entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot index of a live entry with this key. Lookup scans the table;
    /// findability of live keys is the only contract, and partitions stay
    /// small enough that the scan is not worth replacing.
    fn position_of(&self, key: &Key) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Slot::Live { key: k, .. } if k == key))
    }

    /// Inserts or replaces. Returns the previous value when the key was
    /// already present.
    pub fn put(&mut self, key: Key, value: String) -> Option<String> {
        if self.slots.len() / (self.live + 1) < 2 {
            self.grow();
        }
        if let Some(idx) = self.position_of(&key) {
            if let Slot::Live { value: old, .. } = &mut self.slots[idx] {
                return Some(std::mem::replace(old, value));
            }
        }
        self.probe_insert(key, value);
        None
    }

    /// Places a new key at the first empty-or-tombstoned slot on its probe
    /// sequence. The key must not already be live in the table.
    fn probe_insert(&mut self, key: Key, value: String) {
        let cap = self.slots.len();
        let mut idx = key.table_hash() % cap;
        loop {
            if !matches!(self.slots[idx], Slot::Live { .. }) {
                self.slots[idx] = Slot::Live { key, value };
                self.live += 1;
                return;
            }
            idx = (idx + 1) % cap;
        }
    }

    /// Doubles capacity and reinserts live entries in their existing slot
    /// order; tombstones are discarded.
    fn grow(&mut self) {
        let new_cap = self.slots.len() * 2;
        let old = std::mem::replace(&mut self.slots, vec![Slot::Empty; new_cap]);
        self.live = 0;
        for slot in old {
            if let Slot::Live { key, value } = slot {
                self.probe_insert(key, value);
            }
        }
    }

    pub fn get(&self, key: &Key) -> Option<&str> {
        self.position_of(key).map(|idx| match &self.slots[idx] {
            Slot::Live { value, .. } => value.as_str(),
            _ => unreachable!("position_of only returns live slots"),
        })
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.position_of(key).is_some()
    }

    /// Tombstones the entry and returns its value. The slot itself is
    /// reclaimed lazily by a later insertion.
    pub fn remove(&mut self, key: &Key) -> Option<String> {
        let idx = self.position_of(key)?;
        let slot = std::mem::replace(&mut self.slots[idx], Slot::Tombstone);
        self.live -= 1;
        match slot {
            Slot::Live { value, .. } => Some(value),
            _ => unreachable!("position_of only returns live slots"),
        }
    }

    /// Drops every entry, live or tombstoned.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::Empty;
        }
        self.live = 0;
    }
}

impl Default for LocalMap {
    fn default() -> Self {
        Self::new()
    }
}
