//! Typed store façade: routes each operation to the local partition or to
//! the owning peer.

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::node::{Node, NodeConfig};
use crate::store::key::Key;
use crate::store::local::LocalStore;

/// The cluster-wide key-value view from one node. Values of type `V` are
/// carried as their JSON text on the wire and in the map; the owning node
/// of a key is the only node that ever stores it.
pub struct KvStore<V> {
    store: Arc<LocalStore>,
    node: Node,
    _value: PhantomData<fn() -> V>,
}

impl<V> KvStore<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Joins the cluster: registers with the rendezvous server, builds the
    /// mesh, and starts serving peers. Returns once the mesh is complete
    /// and operations may be issued.
    pub async fn connect(cfg: &NodeConfig) -> Result<Self> {
        let store = Arc::new(LocalStore::new());
        let node = Node::start(cfg, Arc::clone(&store)).await?;
        Ok(Self {
            store,
            node,
            _value: PhantomData,
        })
    }

    pub fn index(&self) -> usize {
        self.node.index()
    }

    pub fn num_nodes(&self) -> usize {
        self.node.num_nodes()
    }

    pub fn peer_count(&self) -> usize {
        self.node.peer_count()
    }

    fn owns(&self, key: &Key) -> bool {
        key.owner() == self.node.index()
    }

    /// Stores `value` under `key` on the key's owner. Local keys are
    /// stored directly; foreign keys are forwarded and this returns as
    /// soon as the forward is written, without waiting for the owner to
    /// apply it.
    pub async fn put(&self, key: Key, value: &V) -> Result<()> {
        ensure!(
            key.owner() < self.node.num_nodes(),
            "key {key} names a node outside the cluster"
        );
        let text = serde_json::to_string(value).context("failed to serialize value")?;
        if self.owns(&key) {
            self.store.put(key, text);
            Ok(())
        } else {
            self.node.forward_put(key, text).await
        }
    }

    /// Looks the key up on its owner. `Ok(None)` when the owner does not
    /// have it.
    pub async fn get(&self, key: Key) -> Result<Option<V>> {
        ensure!(
            key.owner() < self.node.num_nodes(),
            "key {key} names a node outside the cluster"
        );
        let text = if self.owns(&key) {
            self.store.get(&key)
        } else {
            self.node.foreign_get(key).await?
        };
        text.map(|t| serde_json::from_str(&t).context("failed to deserialize value"))
            .transpose()
    }

    /// Blocks until the key exists on its owner, then returns its value.
    /// A key that is never put blocks until the cluster shuts down.
    pub async fn wait_and_get(&self, key: Key) -> Result<V> {
        ensure!(
            key.owner() < self.node.num_nodes(),
            "key {key} names a node outside the cluster"
        );
        ensure!(!self.store.purged(), "store has been purged");
        let text = if self.owns(&key) {
            self.store.wait_for(&key).await?
        } else {
            self.node.foreign_wait_get(key).await?
        };
        serde_json::from_str(&text).context("failed to deserialize value")
    }

    /// Drops every locally-owned entry. Idempotent; other nodes'
    /// partitions are untouched.
    pub fn delete_all(&self) {
        self.store.purge();
    }

    /// Number of entries in the local partition only.
    pub fn local_size(&self) -> usize {
        self.store.len()
    }

    /// Asks the rendezvous server to shut the whole cluster down.
    pub async fn teardown(&self) -> Result<()> {
        self.node.initiate_shutdown().await
    }

    /// Resolves once this node's part of the shutdown has completed.
    pub async fn wait_closed(&self) {
        self.node.wait_closed().await
    }
}
