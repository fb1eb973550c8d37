//! Trade print type.

use serde::{Deserialize, Serialize};

use super::level::Side;
use super::{Price, Size, TimestampMs};

/// A public trade print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Execution time (Unix ms)
    pub timestamp_ms: TimestampMs,
    /// Instrument symbol
    pub symbol: String,
    /// Aggressor side
    pub side: Side,
    /// Traded size
    pub size: Size,
    /// Execution price
    pub price: Price,
    /// Exchange match identifier
    pub trade_id: String,
}

impl Trade {
    /// Create a new trade print
    pub fn new(
        timestamp_ms: TimestampMs,
        symbol: impl Into<String>,
        side: Side,
        size: Size,
        price: Price,
        trade_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms,
            symbol: symbol.into(),
            side,
            size,
            price,
            trade_id: trade_id.into(),
        }
    }
}
