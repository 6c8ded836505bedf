//! The rendezvous protocol, phase by phase.

use std::net::SocketAddr;

use anyhow::{bail, ensure, Context, Result};
use futures::future::select_all;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::protocol::{Message, Payload, SERVER_IDX};
use crate::transport::Connection;

/// Accepts exactly `num_nodes` registrations, walks the cluster through
/// mesh construction, then blocks until some node asks for shutdown.
pub struct RendezvousServer {
    listener: TcpListener,
    num_nodes: usize,
}

impl RendezvousServer {
    /// Binds the listener. Accepting starts in [`RendezvousServer::run`],
    /// but the OS queues early connection attempts from here on, so nodes
    /// may be launched as soon as this returns.
    pub async fn bind(num_nodes: usize, addr: SocketAddr) -> Result<Self> {
        ensure!(num_nodes >= 1, "cluster needs at least one node");
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind rendezvous listener on {addr}"))?;
        Ok(Self {
            listener,
            num_nodes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("rendezvous listener has no local address")
    }

    /// Runs one complete cluster lifetime: registration, directory,
    /// mesh sequencing, then the shutdown relay. Returns once every node
    /// has disconnected.
    pub async fn run(self) -> Result<()> {
        info!(num_nodes = self.num_nodes, "rendezvous server waiting for registrations");

        // Indices are assigned purely by registration order.
        let mut conns = Vec::with_capacity(self.num_nodes);
        let mut addrs = Vec::with_capacity(self.num_nodes);
        for index in 0..self.num_nodes {
            let (stream, remote) = self.listener.accept().await?;
            let mut conn = Connection::new(stream);
            match conn.recv().await? {
                Some(Message {
                    payload: Payload::Register { addr },
                    ..
                }) => {
                    info!(index, %addr, %remote, "node registered");
                    addrs.push(addr);
                    conns.push(conn);
                }
                Some(other) => bail!("expected register, got {}", other.kind()),
                None => bail!("node disconnected before registering"),
            }
        }

        let mut directory = Message::directory(0, addrs);
        for (index, conn) in conns.iter_mut().enumerate() {
            directory.retarget(index as i32);
            conn.send(&directory).await?;
        }
        debug!("directory published");

        // Every node but node 0 opens a listener and reports back; only
        // then may node 0, which accepts from nobody, start dialing.
        for (index, conn) in conns.iter_mut().enumerate().skip(1) {
            match conn.recv().await? {
                Some(Message {
                    sender,
                    payload: Payload::Open,
                    ..
                }) => ensure!(
                    sender as usize == index,
                    "open from node {sender} on node {index}'s connection"
                ),
                Some(other) => bail!("expected open, got {}", other.kind()),
                None => bail!("node {index} disconnected before opening"),
            }
        }
        conns[0].send(&Message::connect(0)).await?;
        info!("mesh construction sequenced, waiting for shutdown request");

        // Any node may trigger shutdown; the first Kill wins.
        let initiator = {
            let recvs = conns
                .iter_mut()
                .enumerate()
                .map(|(index, conn)| Box::pin(async move { (index, conn.recv().await) }));
            let ((index, result), _, _) = select_all(recvs).await;
            match result? {
                Some(Message {
                    payload: Payload::Kill,
                    ..
                }) => index,
                Some(other) => bail!("expected kill, got {} from node {index}", other.kind()),
                None => bail!("node {index} disconnected before shutdown"),
            }
        };
        info!(initiator, "shutdown requested, broadcasting kill");

        let mut kill = Message::kill(SERVER_IDX, 0);
        for (index, conn) in conns.iter_mut().enumerate() {
            kill.retarget(index as i32);
            conn.send(&kill).await?;
        }
        for (index, conn) in conns.iter_mut().enumerate() {
            conn.closed().await;
            debug!(index, "node disconnected");
        }
        info!("all nodes closed, rendezvous server done");
        Ok(())
    }
}

impl std::fmt::Debug for RendezvousServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousServer")
            .field("num_nodes", &self.num_nodes)
            .finish()
    }
}
