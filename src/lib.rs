//! Session synchronization core for a tabletop card game companion app.
//!
//! Seats independently-connected clients into shared rooms, caches each
//! participant's last-known attribute map, elects a single per-room host to
//! drive turn rotation, and heals state after reconnects. There is no durable
//! log and no consensus protocol: shared state is merged last-write-wins per
//! attribute key, and "whose turn it is" is computed by whichever client
//! currently believes itself host.

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod sync;

pub use error::Error;
