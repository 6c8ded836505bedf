//! Buffered, framed socket wrapper.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::warn;

use crate::protocol::{Message, EOM, ESC};

const READ_CHUNK: usize = 1024;

/// Byte index of the frame-terminating unescaped EOM, if a complete frame
/// is buffered.
fn frame_end(buf: &[u8]) -> Option<usize> {
    let mut escaped = false;
    for (i, &b) in buf.iter().enumerate() {
        if escaped {
            escaped = false;
        } else if b == ESC as u8 {
            escaped = true;
        } else if b == EOM as u8 {
            return Some(i);
        }
    }
    None
}

/// Reads frames from `stream`, accumulating into `buf`. Bytes past the
/// terminator stay in `buf` for the next call, so a buffered frame is
/// returned without blocking on the socket. `Ok(None)` means the remote
/// closed cleanly at a frame boundary.
async fn read_frame<R>(stream: &mut R, buf: &mut Vec<u8>) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = frame_end(buf) {
            let frame: Vec<u8> = buf.drain(..=end).collect();
            let text = std::str::from_utf8(&frame[..end]).context("frame is not valid utf-8")?;
            return Ok(Some(Message::deserialize(text)?));
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = stream.read(&mut chunk).await.context("socket read failed")?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            bail!("connection closed mid-frame ({} bytes pending)", buf.len());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// One peer connection: a stream socket plus the partial-read buffer.
pub struct Connection {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        Ok(Self::new(stream))
    }

    /// Writes one full serialized message.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        self.stream
            .write_all(msg.serialize().as_bytes())
            .await
            .with_context(|| format!("failed to send {}", msg.kind()))
    }

    /// Next message; `Ok(None)` on clean EOF.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        read_frame(&mut self.stream, &mut self.buf).await
    }

    /// True when a complete frame is already buffered, so the next
    /// [`Connection::recv`] will not block even if the remote sends
    /// nothing further.
    pub fn has_buffered(&self) -> bool {
        frame_end(&self.buf).is_some()
    }

    /// Drains the connection until the remote closes it. Anything still
    /// arriving is discarded with a warning.
    pub async fn closed(&mut self) {
        loop {
            match self.recv().await {
                Ok(Some(msg)) => warn!(kind = msg.kind(), "discarding message while draining"),
                Ok(None) | Err(_) => return,
            }
        }
    }

    /// Splits into independently-owned read and write halves for the
    /// active phase. Buffered bytes move to the reader.
    pub fn split(self) -> (MessageReader, MessageWriter) {
        let (read, write) = self.stream.into_split();
        (
            MessageReader {
                read,
                buf: self.buf,
            },
            MessageWriter { write },
        )
    }
}

/// Read half of a split [`Connection`].
pub struct MessageReader {
    read: OwnedReadHalf,
    buf: Vec<u8>,
}

impl MessageReader {
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        read_frame(&mut self.read, &mut self.buf).await
    }

    pub fn has_buffered(&self) -> bool {
        frame_end(&self.buf).is_some()
    }
}

/// Write half of a split [`Connection`].
pub struct MessageWriter {
    write: OwnedWriteHalf,
}

impl MessageWriter {
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        self.write
            .write_all(msg.serialize().as_bytes())
            .await
            .with_context(|| format!("failed to send {}", msg.kind()))
    }

    /// Sends FIN so the remote observes EOF. Safe to call more than once;
    /// later sends will fail.
    pub async fn shutdown(&mut self) {
        let _ = self.write.shutdown().await;
    }
}
