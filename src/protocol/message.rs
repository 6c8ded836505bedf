//! Message kinds and their text encoding.
//!
//! Every message carries the common header (kind, sender index, target
//! index) plus a kind-specific payload. Messages are transient: built,
//! serialized, sent and dropped. Value payloads are opaque text produced by
//! the value type's own serialization; the protocol layer never inspects
//! them.

use super::escape::{add_escapes, strip_escapes, TokenStream, KEY_SPECIALS, TEXT_SPECIALS};
use super::{ProtocolError, EOM, SERVER_IDX, UNREGISTERED_IDX};
use crate::store::key::Key;

/// Kind-specific payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Node -> server: announce the address the node will be reachable on.
    Register { addr: String },
    /// Server -> node: the full membership list; a node's index is the
    /// position of its own address in this list.
    Directory { addrs: Vec<String> },
    /// Node -> server: this node's listening socket is live.
    Open,
    /// Server -> node 0: every node is accepting, dialing may begin.
    Connect,
    /// Node -> node: identifies the dialing side during mesh setup.
    Greeting,
    /// Store a value under a key on the key's owner.
    Put { key: Key, value: String },
    /// Immediate lookup; answered with a [`Payload::GetReply`].
    Get { key: Key },
    /// Lookup that blocks on the owner until the key appears.
    WaitGet { key: Key },
    /// Answer to a Get/WaitGet. An empty value text means "absent".
    GetReply { key: Key, value: String },
    /// Free-form text between nodes.
    Text { text: String },
    /// Shutdown trigger (from the server) or close notice (from a peer).
    Kill,
}

/// One wire message: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: i32,
    pub target: i32,
    pub payload: Payload,
}

impl Message {
    /// Registration is sent before an index is assigned.
    pub fn register(addr: impl Into<String>) -> Self {
        Self {
            sender: UNREGISTERED_IDX,
            target: SERVER_IDX,
            payload: Payload::Register { addr: addr.into() },
        }
    }

    pub fn directory(target: i32, addrs: Vec<String>) -> Self {
        Self {
            sender: SERVER_IDX,
            target,
            payload: Payload::Directory { addrs },
        }
    }

    pub fn open(sender: i32) -> Self {
        Self {
            sender,
            target: SERVER_IDX,
            payload: Payload::Open,
        }
    }

    pub fn connect(target: i32) -> Self {
        Self {
            sender: SERVER_IDX,
            target,
            payload: Payload::Connect,
        }
    }

    pub fn greeting(sender: i32, target: i32) -> Self {
        Self {
            sender,
            target,
            payload: Payload::Greeting,
        }
    }

    /// A put travels to the key's owner.
    pub fn put(sender: i32, key: Key, value: String) -> Self {
        Self {
            sender,
            target: key.owner() as i32,
            payload: Payload::Put { key, value },
        }
    }

    pub fn get(sender: i32, key: Key) -> Self {
        Self {
            sender,
            target: key.owner() as i32,
            payload: Payload::Get { key },
        }
    }

    pub fn wait_get(sender: i32, key: Key) -> Self {
        Self {
            sender,
            target: key.owner() as i32,
            payload: Payload::WaitGet { key },
        }
    }

    /// A reply travels from the key's owner back to the requester.
    pub fn get_reply(target: i32, key: Key, value: String) -> Self {
        Self {
            sender: key.owner() as i32,
            target,
            payload: Payload::GetReply { key, value },
        }
    }

    pub fn text(sender: i32, target: i32, text: impl Into<String>) -> Self {
        Self {
            sender,
            target,
            payload: Payload::Text { text: text.into() },
        }
    }

    pub fn kill(sender: i32, target: i32) -> Self {
        Self {
            sender,
            target,
            payload: Payload::Kill,
        }
    }

    /// Kind token used on the wire and in log lines.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            Payload::Register { .. } => "Register",
            Payload::Directory { .. } => "Directory",
            Payload::Open => "Open",
            Payload::Connect => "Connect",
            Payload::Greeting => "Greeting",
            Payload::Put { .. } => "Put",
            Payload::Get { .. } => "Get",
            Payload::WaitGet { .. } => "WaitGet",
            Payload::GetReply { .. } => "GetReply",
            Payload::Text { .. } => "Text",
            Payload::Kill => "Kill",
        }
    }

    /// Rewrites the target so one message can be serialized for several
    /// recipients in turn.
    pub fn retarget(&mut self, target: i32) {
        self.target = target;
    }

    /// Encodes this message as one terminated frame.
    pub fn serialize(&self) -> String {
        let body = match &self.payload {
            Payload::Register { addr } => add_escapes(addr, KEY_SPECIALS),
            Payload::Directory { addrs } => {
                let mut body = format!("{} [", addrs.len());
                for (i, addr) in addrs.iter().enumerate() {
                    if i != 0 {
                        body.push(' ');
                    }
                    body.push_str(&add_escapes(addr, KEY_SPECIALS));
                }
                body.push(']');
                body
            }
            Payload::Open | Payload::Connect | Payload::Greeting | Payload::Kill => String::new(),
            Payload::Put { key, value } | Payload::GetReply { key, value } => {
                format!("{}|{}", encode_key(key), add_escapes(value, TEXT_SPECIALS))
            }
            Payload::Get { key } | Payload::WaitGet { key } => encode_key(key),
            Payload::Text { text } => add_escapes(text, TEXT_SPECIALS),
        };
        format!(
            "{} {} {} {{{}}}{}",
            self.kind(),
            self.sender,
            self.target,
            body,
            EOM
        )
    }

    /// Decodes one frame. The trailing terminator may be present or already
    /// stripped by the transport. Dispatches on the leading kind token;
    /// an unrecognized kind or malformed structure is an error.
    pub fn deserialize(frame: &str) -> Result<Self, ProtocolError> {
        let frame = frame.strip_suffix(EOM).unwrap_or(frame);
        let mut ts = TokenStream::new(frame);
        let kind = ts.field()?;
        let sender = ts.index()?;
        let target = ts.index()?;
        ts.until('{')?;

        let payload = match kind {
            "Register" => Payload::Register {
                addr: strip_escapes(ts.until('}')?),
            },
            "Directory" => Payload::Directory {
                addrs: parse_directory(&mut ts)?,
            },
            "Open" | "Connect" | "Greeting" | "Kill" => {
                ts.until('}')?;
                match kind {
                    "Open" => Payload::Open,
                    "Connect" => Payload::Connect,
                    "Greeting" => Payload::Greeting,
                    _ => Payload::Kill,
                }
            }
            "Put" => {
                let key = parse_key(&mut ts, '|')?;
                let value = strip_escapes(ts.until('}')?);
                Payload::Put { key, value }
            }
            "GetReply" => {
                let key = parse_key(&mut ts, '|')?;
                let value = strip_escapes(ts.until('}')?);
                Payload::GetReply { key, value }
            }
            "Get" => Payload::Get {
                key: parse_key(&mut ts, '}')?,
            },
            "WaitGet" => Payload::WaitGet {
                key: parse_key(&mut ts, '}')?,
            },
            "Text" => Payload::Text {
                text: strip_escapes(ts.until('}')?),
            },
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        };

        Ok(Self {
            sender,
            target,
            payload,
        })
    }
}

/// Key wire form: `<escaped label> <owner>`.
fn encode_key(key: &Key) -> String {
    format!("{} {}", add_escapes(key.label(), KEY_SPECIALS), key.owner())
}

/// Parses a key whose owner field runs up to `end`.
fn parse_key(ts: &mut TokenStream<'_>, end: char) -> Result<Key, ProtocolError> {
    let label = strip_escapes(ts.field()?);
    let tok = ts.until(end)?;
    let owner: i32 = tok
        .parse()
        .map_err(|_| ProtocolError::BadIndex(tok.to_string()))?;
    if owner < 0 {
        return Err(ProtocolError::NegativeOwner(owner));
    }
    Ok(Key::new(label, owner as usize))
}

/// Parses `<count> [<addr0> <addr1> ...]` up to the closing brace.
fn parse_directory(ts: &mut TokenStream<'_>) -> Result<Vec<String>, ProtocolError> {
    let tok = ts.field()?;
    let count: usize = tok
        .parse()
        .map_err(|_| ProtocolError::BadCount(tok.to_string()))?;
    ts.until('[')?;
    let mut addrs = Vec::with_capacity(count);
    for i in 0..count {
        let raw = if i + 1 < count {
            ts.field()?
        } else {
            ts.until(']')?
        };
        addrs.push(strip_escapes(raw));
    }
    if count == 0 {
        ts.until(']')?;
    }
    ts.until('}')?;
    Ok(addrs)
}
