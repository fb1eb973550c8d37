//! Fan-out distribution of one logical stream to many consumers.
//!
//! This module contains:
//!
//! - [`distributor`] - The [`Distributor`] handle: publish, subscribe,
//!   child channels, lifecycle
//! - `dispatcher` - The dispatch loop state that owns subscriber queues
//!
//! Each distributor runs one dispatch loop. Subscribers receive a bounded
//! queue; a subscriber that does not accept a message within the delivery
//! timeout is evicted and its queue closed. Child distributors receive every
//! broadcast through their own `publish`, which builds subscriber trees.

use std::fmt;

mod dispatcher;
pub mod distributor;

pub use distributor::Distributor;

/// Opaque handle identifying one subscriber or child registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Bound for values carried through distributors
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}
