//! Single-slot reply mailbox.
//!
//! Holds at most one unclaimed `GetReply` at a time. The dispatch loop
//! delivering a new reply waits until the previous one is claimed, which is
//! fine as long as callers never have two foreign reads outstanding from
//! the same node at once; a correlation-keyed table would lift that limit
//! but this system never needs it.

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::store::key::Key;

pub(crate) struct Mailbox {
    tx: mpsc::Sender<(Key, String)>,
    rx: Mutex<mpsc::Receiver<(Key, String)>>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Puts a reply into the slot, waiting for the slot to be free.
    pub async fn deliver(&self, key: Key, value: String) -> Result<()> {
        self.tx
            .send((key, value))
            .await
            .map_err(|_| anyhow!("mailbox closed"))
    }

    /// Claims the reply for `key`, blocking until it arrives. A reply for
    /// any other key is discarded: with one outstanding foreign read per
    /// node it cannot belong to anyone.
    pub async fn claim(&self, key: &Key) -> Result<String> {
        let mut rx = self.rx.lock().await;
        loop {
            let (got, value) = rx
                .recv()
                .await
                .ok_or_else(|| anyhow!("mailbox closed while waiting for {key}"))?;
            if &got == key {
                return Ok(value);
            }
            warn!(expected = %key, got = %got, "discarding reply for unexpected key");
        }
    }
}
