//! Wire Protocol Module
//!
//! Defines the message kinds exchanged between the rendezvous server and the
//! nodes, and their exact text encoding. This is the on-the-wire
//! compatibility surface: every peer must produce and accept these bytes.
//!
//! ## Envelope
//! Every message is one line: `<Kind> <sender> <target> {<payload>}\n`.
//! Fields are space-delimited; the trailing newline is the frame terminator.
//! Literal occurrences of the terminator, the escape character, the field
//! delimiter or brace/bracket characters inside string payloads are
//! escape-prefixed with `\` and decoding strips exactly one layer.
//!
//! ## Reserved indices
//! Two sender/target values never name a node: `-1` is the rendezvous
//! server and `-2` is a node that has not been assigned an index yet.

pub mod escape;
pub mod message;

pub use message::{Message, Payload};

#[cfg(test)]
mod tests;

use thiserror::Error;

/// End-of-message terminator: one unescaped newline closes a frame.
pub const EOM: char = '\n';
/// Escape character.
pub const ESC: char = '\\';
/// Field delimiter inside the envelope and payloads.
pub const DLM: char = ' ';

/// Reserved index for the rendezvous server.
pub const SERVER_IDX: i32 = -1;
/// Reserved index for a node that has not received the directory yet.
pub const UNREGISTERED_IDX: i32 = -2;

/// Decoding failure. Any of these is a fatal protocol violation for the
/// connection it occurred on; there is no recovery path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown message kind `{0}`")]
    UnknownKind(String),
    #[error("missing `{0:?}` delimiter")]
    MissingDelimiter(char),
    #[error("invalid index field `{0}`")]
    BadIndex(String),
    #[error("invalid count field `{0}`")]
    BadCount(String),
    #[error("key owner index must be non-negative, got {0}")]
    NegativeOwner(i32),
}
