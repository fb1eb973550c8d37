//! Order book level types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{LevelId, Price, Size};

/// Book side of a price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Resting bids
    Buy,
    /// Resting asks
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("Buy"),
            Side::Sell => f.write_str("Sell"),
        }
    }
}

/// One aggregated price level (market-by-level).
///
/// Levels are keyed by price inside the book: a price can only rest on one
/// side at a time, and an update replaces the stored level wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Instrument symbol
    pub symbol: String,
    /// Exchange level identifier
    pub id: LevelId,
    /// Book side
    pub side: Side,
    /// Total size resting at this price
    pub size: Size,
    /// Level price
    pub price: Price,
}

impl PriceLevel {
    /// Create a new price level
    pub fn new(
        symbol: impl Into<String>,
        id: LevelId,
        side: Side,
        size: Size,
        price: Price,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            id,
            side,
            size,
            price,
        }
    }

    /// Same identity and price with a different size
    #[must_use]
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serialization() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"Buy\"");
        let side: Side = serde_json::from_str("\"Sell\"").unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(side.opposite(), Side::Buy);
    }

    #[test]
    fn test_level_deserialization() {
        let json = r#"{"symbol":"XBTUSD","id":8799000100,"side":"Buy","size":25000,"price":9990.5}"#;
        let level: PriceLevel = serde_json::from_str(json).unwrap();
        assert_eq!(level.side, Side::Buy);
        assert_eq!(level.price, 9990.5);
        assert_eq!(level.size, 25000.0);
    }
}
