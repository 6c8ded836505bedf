//! Key-Value Store Module
//!
//! Each node owns one partition of the cluster's key space. A key carries
//! the index of its owning node, fixed for the lifetime of the cluster;
//! the owner's [`map::LocalMap`] is the only place that key's value ever
//! lives.
//!
//! ## Layers
//! - **`key`**: the (label, owner index) pair identifying a value.
//! - **`map`**: open-addressing hash table with tombstone deletion; the
//!   physical storage for one node's partition.
//! - **`local`**: the map behind a mutex plus the put-notification used by
//!   blocking reads, and the one-shot purge that runs at teardown.
//! - **`kv`**: the typed façade applications call; routes each operation
//!   to local storage or to the owning peer through the node layer.

pub mod key;
pub mod kv;
pub mod local;
pub mod map;

pub use key::Key;
pub use kv::KvStore;

#[cfg(test)]
mod tests;
