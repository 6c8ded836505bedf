//! Rendezvous Server Module
//!
//! The fixed meeting point of a cluster run. The server assigns node
//! indices by registration order, publishes the directory, sequences the
//! mesh construction so node 0 dials last, and relays the shutdown
//! trigger. It holds no key data and routes no KV traffic; once the mesh
//! is up it only waits for a Kill.

pub mod rendezvous;

pub use rendezvous::RendezvousServer;
