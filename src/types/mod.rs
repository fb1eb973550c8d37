//! Feed record types exchanged with the decoding and session layers.
//!
//! This module contains the already-decoded shapes the cache consumes and
//! re-emits:
//!
//! - [`level`] - Order book price levels and sides
//! - [`trade`] - Trade prints
//! - [`messages`] - The `{table, action, data}` envelope shared by all streams

pub mod level;
pub mod messages;
pub mod trade;

pub use level::{PriceLevel, Side};
pub use messages::{Action, MblMessage, TableMessage, TradeMessage};
pub use trade::Trade;

/// Price of a level or trade.
///
/// Exchange feeds quote instruments with fractional tick sizes, so prices
/// stay as `f64`. Comparisons inside the ladder use `f64::total_cmp`.
pub type Price = f64;

/// Size resting at a level or traded in a print
pub type Size = f32;

/// Exchange-assigned level identifier
pub type LevelId = u64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;
