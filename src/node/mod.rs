//! Node Module
//!
//! One process in the cluster. A node registers with the rendezvous
//! server, learns its index from the directory, builds its slice of the
//! full peer mesh (accepting from lower indices, dialing higher ones), and
//! then runs a dispatch task that routes every inbound message: stores for
//! puts, replies for gets, wait workers for blocking gets, and the
//! cascading teardown when a kill arrives.
//!
//! ## Submodules
//! - **`mesh`**: the one-time handshake that produces the peer array.
//! - **`dispatch`**: the inbound event loop and the teardown wavefront.
//! - **`mailbox`**: the single-slot holding area for `GetReply` messages.

mod dispatch;
mod mailbox;
mod mesh;


use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::protocol::{Message, SERVER_IDX};
use crate::store::key::Key;
use crate::store::local::LocalStore;
use crate::transport::{MessageReader, MessageWriter};

use mailbox::Mailbox;

/// Where an inbound message physically arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceId {
    Server,
    Peer(usize),
}

/// Network addresses a node needs to join a cluster. The bind address is
/// both the listener address and the address advertised in the directory.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub server_addr: SocketAddr,
}

/// Write side and reader task of one established peer connection.
pub(crate) struct PeerHandle {
    writer: tokio::sync::Mutex<MessageWriter>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PeerHandle {
    fn new(writer: MessageWriter, reader: JoinHandle<()>) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
            reader: parking_lot::Mutex::new(Some(reader)),
            closed: AtomicBool::new(false),
        }
    }
}

/// State shared between the dispatch task, wait workers, and the public
/// API. The peer array is sized once from the directory and never changes.
pub(crate) struct NodeShared {
    pub(crate) index: usize,
    pub(crate) num_nodes: usize,
    pub(crate) store: Arc<LocalStore>,
    pub(crate) mailbox: Mailbox,
    peers: Vec<Option<PeerHandle>>,
    server_writer: tokio::sync::Mutex<MessageWriter>,
    server_reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    workers: parking_lot::Mutex<Vec<Option<JoinHandle<()>>>>,
    teardown: AtomicBool,
}

impl NodeShared {
    pub(crate) fn teardown_started(&self) -> bool {
        self.teardown.load(Ordering::SeqCst)
    }

    /// Marks teardown started; true only for the caller that flipped it.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.teardown.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn peer_closed(&self, idx: usize) -> bool {
        self.peers[idx]
            .as_ref()
            .map(|p| p.closed.load(Ordering::SeqCst))
            .unwrap_or(true)
    }

    /// Sends to the message's target peer. The target must be a valid,
    /// non-self index; a message bound for an already-closed peer is
    /// dropped rather than treated as fatal, which only happens for
    /// replies raced by teardown.
    pub(crate) async fn send_to_peer(&self, msg: &Message) -> Result<()> {
        let target = msg.target;
        ensure!(
            target >= 0 && (target as usize) < self.num_nodes,
            "target index {target} out of range"
        );
        let target = target as usize;
        ensure!(target != self.index, "node {} cannot send to itself", self.index);
        let peer = self.peers[target]
            .as_ref()
            .ok_or_else(|| anyhow!("no connection for node {target}"))?;
        if peer.closed.load(Ordering::SeqCst) {
            warn!(kind = msg.kind(), target, "dropping message to closed peer");
            return Ok(());
        }
        peer.writer.lock().await.send(msg).await
    }

    pub(crate) async fn send_to_server(&self, msg: &Message) -> Result<()> {
        self.server_writer.lock().await.send(msg).await
    }

    /// Closes our side of a peer connection. Idempotent.
    pub(crate) async fn close_peer(&self, idx: usize) {
        let Some(peer) = self.peers[idx].as_ref() else {
            return;
        };
        if peer.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(reader) = peer.reader.lock().take() {
            reader.abort();
        }
        peer.writer.lock().await.shutdown().await;
        debug!(node = self.index, peer = idx, "closed peer connection");
    }

    pub(crate) async fn close_server(&self) {
        if let Some(reader) = self.server_reader.lock().take() {
            reader.abort();
        }
        self.server_writer.lock().await.shutdown().await;
        debug!(node = self.index, "closed server connection");
    }

    /// Waits for the peer to close its side (its reader task ends at EOF),
    /// then releases ours.
    pub(crate) async fn await_peer_eof(&self, idx: usize) {
        let Some(peer) = self.peers[idx].as_ref() else {
            return;
        };
        let reader = peer.reader.lock().take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }
        peer.closed.store(true, Ordering::SeqCst);
        peer.writer.lock().await.shutdown().await;
    }

    /// Starts a background worker answering a peer's WaitGet. At most one
    /// worker per peer: a duplicate request while one is still running is
    /// dropped (an idempotent retry, not an error); a finished worker's
    /// slot is reclaimed here.
    pub(crate) fn spawn_wait_worker(self: &Arc<Self>, requester: usize, key: Key) {
        let mut workers = self.workers.lock();
        if let Some(handle) = &workers[requester] {
            if !handle.is_finished() {
                debug!(
                    node = self.index,
                    requester, "dropping duplicate wait-get while worker active"
                );
                return;
            }
        }
        let shared = Arc::clone(self);
        workers[requester] = Some(tokio::spawn(async move {
            match shared.store.wait_for(&key).await {
                Ok(value) => {
                    let reply = Message::get_reply(requester as i32, key, value);
                    if let Err(e) = shared.send_to_peer(&reply).await {
                        warn!(requester, "failed to send wait-get reply: {e:#}");
                    }
                }
                Err(e) => warn!(requester, "wait-get worker stopped: {e:#}"),
            }
        }));
    }

    /// Stops workers still blocked on keys that never arrived. Only called
    /// once the sockets they would answer on are closed.
    pub(crate) fn abort_workers(&self) {
        for worker in self.workers.lock().iter_mut() {
            if let Some(handle) = worker.take() {
                handle.abort();
            }
        }
    }

    pub(crate) fn populated_peer_slots(&self) -> usize {
        self.peers.iter().filter(|p| p.is_some()).count()
    }
}

/// Forwards every frame from one connection into the node's inbound
/// channel, preserving per-sender order. Ends at EOF, on a read error, or
/// when the dispatch side is gone.
fn spawn_reader(
    src: SourceId,
    mut reader: MessageReader,
    tx: UnboundedSender<(SourceId, Message)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match reader.recv().await {
                Ok(Some(msg)) => {
                    if tx.send((src, msg)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(?src, "connection read failed: {e:#}");
                    break;
                }
            }
        }
    })
}

/// Handle to a running cluster node: the mesh, the dispatch task, and the
/// operations the store façade delegates to for foreign keys.
pub struct Node {
    shared: Arc<NodeShared>,
    dispatch: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Runs the full handshake against the rendezvous server and starts
    /// the dispatch task. Returns once the mesh is complete.
    pub async fn start(cfg: &NodeConfig, store: Arc<LocalStore>) -> Result<Self> {
        let (shared, inbound) = mesh::join(cfg, store).await?;
        let handle = tokio::spawn(dispatch::run(Arc::clone(&shared), inbound));
        Ok(Self {
            shared,
            dispatch: tokio::sync::Mutex::new(Some(handle)),
        })
    }

    /// Index assigned by the directory; fixed for the cluster run.
    pub fn index(&self) -> usize {
        self.shared.index
    }

    pub fn num_nodes(&self) -> usize {
        self.shared.num_nodes
    }

    /// Number of populated peer slots; N-1 after a successful handshake.
    pub fn peer_count(&self) -> usize {
        self.shared.populated_peer_slots()
    }

    /// Sends a put for a foreign key to its owner. Ownership of the value
    /// text moves to the owner; nothing is kept here.
    pub(crate) async fn forward_put(&self, key: Key, value: String) -> Result<()> {
        let msg = Message::put(self.shared.index as i32, key, value);
        self.shared.send_to_peer(&msg).await
    }

    /// Sends a get to the key's owner and blocks on the reply mailbox.
    /// An empty reply text means the owner does not have the key.
    pub(crate) async fn foreign_get(&self, key: Key) -> Result<Option<String>> {
        let msg = Message::get(self.shared.index as i32, key.clone());
        self.shared.send_to_peer(&msg).await?;
        let value = self.shared.mailbox.claim(&key).await?;
        Ok((!value.is_empty()).then_some(value))
    }

    /// Sends a wait-get to the key's owner and blocks on the reply
    /// mailbox until the owner has the key.
    pub(crate) async fn foreign_wait_get(&self, key: Key) -> Result<String> {
        let msg = Message::wait_get(self.shared.index as i32, key.clone());
        self.shared.send_to_peer(&msg).await?;
        self.shared.mailbox.claim(&key).await
    }

    /// Asks the server to shut the whole cluster down. The server answers
    /// by broadcasting Kill to every node, ours included.
    pub async fn initiate_shutdown(&self) -> Result<()> {
        self.shared
            .send_to_server(&Message::kill(self.shared.index as i32, SERVER_IDX))
            .await
    }

    /// Resolves once this node's teardown has completed and the dispatch
    /// task has exited.
    pub async fn wait_closed(&self) {
        let mut guard = self.dispatch.lock().await;
        if let Some(handle) = guard.as_mut() {
            let _ = handle.await;
        }
        *guard = None;
    }
}
