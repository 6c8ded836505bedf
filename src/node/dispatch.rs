//! The node's single dispatch task and the teardown wavefront.
//!
//! All inbound traffic funnels through one channel, so every handler runs
//! on one task and per-sender order is preserved end to end. A dispatch
//! failure is a protocol violation or a lost connection mid-run; neither
//! has a recovery path, so the process exits.

use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::protocol::{Message, Payload};

use super::{NodeShared, SourceId};

type Inbound = UnboundedReceiver<(SourceId, Message)>;

pub(super) async fn run(shared: Arc<NodeShared>, mut inbound: Inbound) {
    if let Err(e) = dispatch_loop(&shared, &mut inbound).await {
        error!(node = shared.index, "dispatch failed: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch_loop(shared: &Arc<NodeShared>, inbound: &mut Inbound) -> Result<()> {
    loop {
        let Some((src, msg)) = inbound.recv().await else {
            bail!("all connections closed before shutdown");
        };
        match (src, &msg.payload) {
            (SourceId::Server, Payload::Kill) => {
                if shared.begin_teardown() {
                    teardown(shared, inbound).await?;
                }
                return Ok(());
            }
            (SourceId::Server, _) => {
                bail!("unexpected {} from server during active phase", msg.kind())
            }
            // A peer that finished its own teardown ahead of our Kill.
            (SourceId::Peer(i), Payload::Kill) => shared.close_peer(i).await,
            (SourceId::Peer(i), _) => handle_peer_message(shared, i, msg).await?,
        }
    }
}

/// Handles one message from an established peer. `src` is the index the
/// connection belongs to, which is authoritative over the header's sender
/// field.
async fn handle_peer_message(shared: &Arc<NodeShared>, src: usize, msg: Message) -> Result<()> {
    let kind = msg.kind();
    match msg.payload {
        Payload::Put { key, value } => {
            ensure!(
                key.owner() == shared.index,
                "put for key owned by node {} routed to node {}",
                key.owner(),
                shared.index
            );
            shared.store.put(key, value);
        }
        Payload::Get { key } => {
            ensure!(
                key.owner() == shared.index,
                "get for key owned by node {} routed to node {}",
                key.owner(),
                shared.index
            );
            // Absence is encoded as an empty value text; values themselves
            // are serialized and never empty on the wire.
            let value = shared.store.get(&key).unwrap_or_default();
            shared
                .send_to_peer(&Message::get_reply(src as i32, key, value))
                .await?;
        }
        Payload::WaitGet { key } => {
            ensure!(
                key.owner() == shared.index,
                "wait-get for key owned by node {} routed to node {}",
                key.owner(),
                shared.index
            );
            shared.spawn_wait_worker(src, key);
        }
        Payload::GetReply { key, value } => {
            ensure!(
                msg.target as usize == shared.index,
                "reply addressed to node {} arrived at node {}",
                msg.target,
                shared.index
            );
            shared.mailbox.deliver(key, value).await?;
        }
        Payload::Text { text } => info!(from = src, %text, "text message"),
        _ => bail!("unexpected {kind} from node {src}"),
    }
    Ok(())
}

/// The local leg of the cluster-wide shutdown wavefront.
///
/// Order matters: pending traffic is drained first, then the server link
/// drops, then every lower peer is awaited (their Kill tells us they have
/// finished sending) while reads are still served, and only then do we
/// notify higher peers and wait for them to release us. Workers blocked on
/// keys that will never arrive are cut loose last, once nobody is left to
/// receive their replies.
async fn teardown(shared: &Arc<NodeShared>, inbound: &mut Inbound) -> Result<()> {
    info!(node = shared.index, "teardown started");

    // Everything already queued gets full service before anything closes.
    while let Ok((src, msg)) = inbound.try_recv() {
        match (src, &msg.payload) {
            (SourceId::Peer(i), Payload::Kill) => shared.close_peer(i).await,
            (SourceId::Peer(i), _) => handle_peer_message(shared, i, msg).await?,
            (SourceId::Server, _) => {
                warn!(kind = msg.kind(), "discarding server message during teardown")
            }
        }
    }
    shared.close_server().await;

    // Lower-indexed peers close toward us; serve their last reads until
    // each one says Kill.
    let mut remaining: Vec<usize> = (0..shared.index)
        .filter(|&i| !shared.peer_closed(i))
        .collect();
    while !remaining.is_empty() {
        let Some((src, msg)) = inbound.recv().await else {
            bail!("peer connection lost during teardown");
        };
        match (src, &msg.payload) {
            (SourceId::Peer(i), Payload::Kill) => {
                shared.close_peer(i).await;
                remaining.retain(|&r| r != i);
            }
            (SourceId::Peer(i), _) => handle_peer_message(shared, i, msg).await?,
            (SourceId::Server, _) => {
                warn!(kind = msg.kind(), "discarding server message during teardown")
            }
        }
    }

    // Now the wavefront moves upward: tell every higher peer we are done
    // sending, then wait for each to drop the connection.
    for j in shared.index + 1..shared.num_nodes {
        shared
            .send_to_peer(&Message::kill(shared.index as i32, j as i32))
            .await?;
    }
    for j in shared.index + 1..shared.num_nodes {
        shared.await_peer_eof(j).await;
    }

    shared.abort_workers();
    shared.store.purge();
    info!(node = shared.index, "teardown complete");
    Ok(())
}
