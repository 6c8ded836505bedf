//! Mesh construction: the rendezvous handshake and the ordered
//! accept/dial pattern that makes N(N-1)/2 crossing connections
//! deadlock-free. A node only ever accepts from lower indices and dials
//! higher ones, so no two nodes wait on each other.

use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

use crate::protocol::{Message, Payload};
use crate::store::local::LocalStore;
use crate::transport::Connection;

use super::mailbox::Mailbox;
use super::{spawn_reader, NodeConfig, NodeShared, PeerHandle, SourceId};

/// Registers with the rendezvous server, builds the peer mesh, and splits
/// every connection into its active-phase halves. On success the node has
/// one open connection to every other node plus the server connection,
/// with all reader tasks feeding the returned inbound channel.
pub(super) async fn join(
    cfg: &NodeConfig,
    store: Arc<LocalStore>,
) -> Result<(Arc<NodeShared>, UnboundedReceiver<(SourceId, Message)>)> {
    let own_addr = cfg.bind_addr.to_string();
    let mut server = Connection::connect(cfg.server_addr).await?;
    server.send(&Message::register(own_addr.clone())).await?;
    debug!(addr = %own_addr, "registered with rendezvous server");

    let addrs = match server.recv().await? {
        Some(Message {
            payload: Payload::Directory { addrs },
            ..
        }) => addrs,
        Some(other) => bail!("expected directory, got {}", other.kind()),
        None => bail!("server closed before sending directory"),
    };
    let index = addrs
        .iter()
        .position(|a| *a == own_addr)
        .ok_or_else(|| anyhow!("own address {own_addr} missing from directory"))?;
    let num_nodes = addrs.len();
    info!(index, num_nodes, "received directory");

    let mut conns: Vec<Option<Connection>> = (0..num_nodes).map(|_| None).collect();

    // Accept phase: every lower-indexed node will dial us. Node 0 accepts
    // from nobody and does not even open a listener.
    if index > 0 {
        let listener = TcpListener::bind(cfg.bind_addr)
            .await
            .with_context(|| format!("failed to bind listener on {}", cfg.bind_addr))?;
        server.send(&Message::open(index as i32)).await?;
        for _ in 0..index {
            let (stream, _) = listener.accept().await?;
            let mut conn = Connection::new(stream);
            match conn.recv().await? {
                Some(Message {
                    sender,
                    payload: Payload::Greeting,
                    ..
                }) => {
                    let s = usize::try_from(sender)
                        .ok()
                        .filter(|&s| s < index)
                        .ok_or_else(|| anyhow!("greeting from unexpected index {sender}"))?;
                    ensure!(conns[s].is_none(), "duplicate greeting from node {s}");
                    conns[s] = Some(conn);
                }
                Some(other) => bail!("expected greeting, got {}", other.kind()),
                None => bail!("peer closed before sending greeting"),
            }
        }
        debug!(index, accepted = index, "all lower peers connected");
    }

    // Dial phase: node 0 has no listener of its own to report, so the
    // server tells it explicitly once every other listener is live.
    if index == 0 {
        match server.recv().await? {
            Some(Message {
                payload: Payload::Connect,
                ..
            }) => {}
            Some(other) => bail!("expected connect, got {}", other.kind()),
            None => bail!("server closed before sending connect"),
        }
    }
    for (j, addr) in addrs.iter().enumerate().skip(index + 1) {
        let peer_addr = addr
            .parse()
            .with_context(|| format!("bad directory address `{addr}`"))?;
        let mut conn = Connection::connect(peer_addr).await?;
        conn.send(&Message::greeting(index as i32, j as i32)).await?;
        conns[j] = Some(conn);
    }
    info!(index, peers = num_nodes - 1, "mesh established");

    // Active phase: one reader task per connection, one shared inbound
    // channel. Per-sender order is preserved because each task forwards
    // its frames in read order.
    let (tx, inbound) = mpsc::unbounded_channel();
    let (server_reader, server_writer) = server.split();
    let server_task = spawn_reader(SourceId::Server, server_reader, tx.clone());

    let mut peers = Vec::with_capacity(num_nodes);
    for (j, conn) in conns.into_iter().enumerate() {
        match conn {
            Some(conn) => {
                let (reader, writer) = conn.split();
                let task = spawn_reader(SourceId::Peer(j), reader, tx.clone());
                peers.push(Some(PeerHandle::new(writer, task)));
            }
            None => {
                ensure!(j == index, "no connection established for node {j}");
                peers.push(None);
            }
        }
    }

    let shared = Arc::new(NodeShared {
        index,
        num_nodes,
        store,
        mailbox: Mailbox::new(),
        peers,
        server_writer: tokio::sync::Mutex::new(server_writer),
        server_reader: parking_lot::Mutex::new(Some(server_task)),
        workers: parking_lot::Mutex::new((0..num_nodes).map(|_| None).collect()),
        teardown: std::sync::atomic::AtomicBool::new(false),
    });
    Ok((shared, inbound))
}
