//! The session synchronization core: connection registry, shared-state
//! cache, host arbiter, turn rotation, and reconnection recovery.

pub mod arbiter;
pub mod cache;
pub mod recovery;
pub mod registry;
pub mod turn;
