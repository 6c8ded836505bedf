//! Distributed Key-Value Store Library
//!
//! This library crate defines the core modules that make up the distributed
//! key-value cluster. It serves as the foundation for the binary executable
//! (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`protocol`**: The wire grammar. Eleven text message kinds with a
//!   common envelope, escape rules, and the reserved server/unregistered
//!   indices. This layer is the cross-process compatibility surface.
//! - **`transport`**: Framed message I/O over TCP. Buffered connections
//!   that deliver whole frames, plus the split reader/writer halves used
//!   during a node's active phase.
//! - **`server`**: The rendezvous point. Assigns node indices by
//!   registration order, publishes the directory, sequences mesh
//!   construction, and relays the shutdown trigger.
//! - **`node`**: One cluster process. Builds its slice of the full mesh
//!   (accept from lower indices, dial higher), dispatches all inbound
//!   traffic on a single task, and runs the cascading teardown.
//! - **`store`**: The key-value state. An open-addressing local map per
//!   node plus the typed `KvStore` façade that routes each operation to
//!   the key's owning node.

pub mod node;
pub mod protocol;
pub mod server;
pub mod store;
pub mod transport;
