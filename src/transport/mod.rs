//! Transport Module
//!
//! Framed message I/O over TCP. A frame is one serialized message ending in
//! an unescaped terminator; a read from the socket may deliver part of a
//! frame, exactly one, or several, so every connection keeps a byte buffer
//! and hands out complete frames from it before touching the socket again.
//!
//! During the node's active phase each connection is split into a reader
//! half (owned by a per-connection task that feeds the node's inbound
//! channel) and a writer half shared behind a lock.

pub mod connection;

pub use connection::{Connection, MessageReader, MessageWriter};

#[cfg(test)]
mod tests;
