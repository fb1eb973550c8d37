//! Error types for the feed-cache crate.
//!
//! This module defines the errors raised while applying feed messages to the
//! book, while driving actor lifecycles and while distributing messages to
//! subscribers.

use thiserror::Error;

use crate::channel::SessionId;
use crate::types::{Action, LevelId, Price, Side};

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// Insert of a price that already rests in the book
    #[error("duplicate price level at {price}")]
    DuplicatePrice {
        /// Offending price
        price: Price,
    },

    /// Ladder removal of a price it does not hold
    #[error("price {price} not found in ladder")]
    PriceNotFound {
        /// Missing price
        price: Price,
    },

    /// Update or delete of a level the book does not hold
    #[error("no level at price {price}")]
    OrderNotFound {
        /// Missing price
        price: Price,
    },

    /// Stored level and incoming message disagree on the side
    #[error("side mismatch at {price}: book has {stored}, message has {incoming}")]
    SideMismatch {
        /// Level price
        price: Price,
        /// Side held by the book
        stored: Side,
        /// Side carried by the message
        incoming: Side,
    },

    /// Stored level and incoming message disagree on the level id
    #[error("id mismatch at {price}: book has {stored}, message has {incoming}")]
    IdMismatch {
        /// Level price
        price: Price,
        /// Id held by the book
        stored: LevelId,
        /// Id carried by the message
        incoming: LevelId,
    },

    /// Cold-start partial with no levels
    #[error("partial snapshot contains no levels")]
    EmptyPartial,

    /// Action not handled by this table
    #[error("action {action} is not valid for table {table}")]
    InvalidAction {
        /// Table that rejected the message
        table: String,
        /// Rejected action
        action: Action,
    },

    /// `start` called more than once
    #[error("{0} already started")]
    AlreadyStarted(String),

    /// `stop`/`close` called more than once
    #[error("{0} already closed")]
    AlreadyClosed(String),

    /// Operation requires a running actor
    #[error("{0} is not running")]
    NotReady(String),

    /// Publish to a closed queue or channel
    #[error("destination closed")]
    DestinationClosed,

    /// Subscriber did not accept a message within the delivery timeout
    #[error("subscriber {session} timed out")]
    SubscriberTimeout {
        /// Evicted session
        session: SessionId,
    },

    /// No distribution channel registered for this depth
    #[error("no channel registered for depth {0}")]
    UnknownDepth(usize),

    /// Channel connected as a child of itself
    #[error("{0} cannot relay to itself")]
    SelfRelay(String),

    /// Probe was dropped before it replied (actor cancelled)
    #[error("probe abandoned before reply")]
    ProbeAbandoned,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error only rejects one message and leaves the book usable
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::DuplicatePrice { .. }
                | Error::PriceNotFound { .. }
                | Error::OrderNotFound { .. }
                | Error::SideMismatch { .. }
                | Error::IdMismatch { .. }
                | Error::EmptyPartial
                | Error::InvalidAction { .. }
        )
    }

    /// Check if this error reports lifecycle misuse
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Error::AlreadyStarted(_) | Error::AlreadyClosed(_) | Error::NotReady(_)
        )
    }
}
