//! Side-aware sorted price ladder.
//!
//! Prices are kept in a plain vector ordered so the best price is always the
//! last element: ascending for bids (highest bid last), descending for asks
//! (lowest ask last). Positions are 1-based distances from that tail, so
//! position 1 is the best price on either side.
//!
//! Lookups are binary searches; inserts and removals shift the vector. Book
//! depth is small (hundreds to a few thousand levels), where a contiguous
//! vector beats a tree on cache behaviour.

use std::cmp::Ordering;

use crate::error::Error;
use crate::types::{Price, Side};

/// Sorted distinct prices for one side of the book
#[derive(Debug, Clone)]
pub struct PriceLadder {
    side: Side,
    /// Worst price first, best price last
    prices: Vec<Price>,
}

impl PriceLadder {
    /// Create an empty ladder for a side
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            prices: Vec::new(),
        }
    }

    /// Side this ladder holds
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Number of price levels
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Check if the ladder holds no prices
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Storage order: `Less` means `a` sits closer to the worst end.
    fn order(&self, a: Price, b: Price) -> Ordering {
        match self.side {
            Side::Buy => a.total_cmp(&b),
            Side::Sell => b.total_cmp(&a),
        }
    }

    fn locate(&self, price: Price) -> Result<usize, usize> {
        self.prices.binary_search_by(|probe| self.order(*probe, price))
    }

    fn position_of(&self, index: usize) -> usize {
        self.prices.len() - index
    }

    /// Insert a price, returning its position after the insert
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePrice`] if the price is already present.
    pub fn insert(&mut self, price: Price) -> Result<usize, Error> {
        match self.locate(price) {
            Ok(_) => Err(Error::DuplicatePrice { price }),
            Err(index) => {
                self.prices.insert(index, price);
                Ok(self.position_of(index))
            }
        }
    }

    /// Remove a price, returning the position it held before removal
    ///
    /// # Errors
    ///
    /// Returns [`Error::PriceNotFound`] if the price is absent.
    pub fn remove(&mut self, price: Price) -> Result<usize, Error> {
        match self.locate(price) {
            Ok(index) => {
                let position = self.position_of(index);
                self.prices.remove(index);
                Ok(position)
            }
            Err(_) => Err(Error::PriceNotFound { price }),
        }
    }

    /// Current position of a price, or `None` if absent
    #[must_use]
    pub fn search(&self, price: Price) -> Option<usize> {
        self.locate(price).ok().map(|index| self.position_of(index))
    }

    /// Price at a 1-based position from the best price
    #[must_use]
    pub fn price_at(&self, position: usize) -> Option<Price> {
        if position == 0 || position > self.prices.len() {
            return None;
        }
        self.prices.get(self.prices.len() - position).copied()
    }

    /// Best price on this side
    #[must_use]
    pub fn best(&self) -> Option<Price> {
        self.prices.last().copied()
    }

    /// Prices from best to worst
    pub fn iter_best_first(&self) -> impl DoubleEndedIterator<Item = Price> + '_ {
        self.prices.iter().rev().copied()
    }

    /// Prices in storage order (worst to best)
    #[must_use]
    pub fn as_slice(&self) -> &[Price] {
        &self.prices
    }

    /// Replace the content with an unordered set of prices
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePrice`] if the input repeats a price; the
    /// ladder is left untouched in that case.
    pub fn rebuild(&mut self, prices: impl IntoIterator<Item = Price>) -> Result<(), Error> {
        let mut sorted: Vec<Price> = prices.into_iter().collect();
        sorted.sort_by(|a, b| self.order(*a, *b));
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::DuplicatePrice { price: pair[0] });
        }
        self.prices = sorted;
        Ok(())
    }

    /// Remove every price
    pub fn clear(&mut self) {
        self.prices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(side: Side, prices: &[Price]) -> PriceLadder {
        let mut ladder = PriceLadder::new(side);
        for &price in prices {
            ladder.insert(price).unwrap();
        }
        ladder
    }

    #[test]
    fn test_bids_store_ascending() {
        let bids = ladder(Side::Buy, &[9992.0, 9990.0, 9994.0, 9991.0, 9993.0]);
        assert_eq!(bids.as_slice(), &[9990.0, 9991.0, 9992.0, 9993.0, 9994.0]);
        assert_eq!(bids.best(), Some(9994.0));
    }

    #[test]
    fn test_asks_store_descending() {
        let mut asks = ladder(Side::Sell, &[10001.0, 10000.0, 9998.0]);
        let position = asks.insert(9999.0).unwrap();

        assert_eq!(asks.as_slice(), &[10001.0, 10000.0, 9999.0, 9998.0]);
        assert_eq!(position, 2);
        assert_eq!(asks.best(), Some(9998.0));
    }

    #[test]
    fn test_insert_best_is_position_one() {
        let mut bids = ladder(Side::Buy, &[100.0, 101.0]);
        assert_eq!(bids.insert(102.0).unwrap(), 1);
        assert_eq!(bids.insert(99.0).unwrap(), 4);
    }

    #[test]
    fn test_duplicate_insert() {
        let mut bids = ladder(Side::Buy, &[100.0]);
        assert!(matches!(
            bids.insert(100.0),
            Err(Error::DuplicatePrice { price }) if price == 100.0
        ));
        assert_eq!(bids.len(), 1);
    }

    #[test]
    fn test_remove_reports_pre_removal_position() {
        let mut asks = ladder(Side::Sell, &[10.0, 11.0, 12.0]);
        assert_eq!(asks.remove(11.0).unwrap(), 2);
        assert_eq!(asks.as_slice(), &[12.0, 10.0]);
        assert!(matches!(asks.remove(11.0), Err(Error::PriceNotFound { .. })));
    }

    #[test]
    fn test_search_and_price_at() {
        let bids = ladder(Side::Buy, &[1.0, 2.0, 3.0]);
        assert_eq!(bids.search(3.0), Some(1));
        assert_eq!(bids.search(1.0), Some(3));
        assert_eq!(bids.search(1.5), None);
        assert_eq!(bids.price_at(2), Some(2.0));
        assert_eq!(bids.price_at(0), None);
        assert_eq!(bids.price_at(4), None);
    }

    #[test]
    fn test_rebuild_rejects_duplicates() {
        let mut asks = ladder(Side::Sell, &[5.0]);
        assert!(asks.rebuild([7.0, 6.0, 7.0]).is_err());
        assert_eq!(asks.as_slice(), &[5.0]);

        asks.rebuild([6.0, 8.0, 7.0]).unwrap();
        assert_eq!(asks.as_slice(), &[8.0, 7.0, 6.0]);
        assert_eq!(asks.iter_best_first().collect::<Vec<_>>(), vec![6.0, 7.0, 8.0]);
    }
}
