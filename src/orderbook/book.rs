//! Core order book state.
//!
//! The book owns every [`PriceLevel`] in a price-keyed map and indexes them
//! with two [`PriceLadder`]s:
//!
//! - O(1) lookup of a level by price
//! - O(log n) position search, best price at the ladder tail
//! - Cached best bid/ask, refreshed only when a depth-1 level changes

use rustc_hash::FxHashMap;
use tracing::warn;

use super::ladder::PriceLadder;
use crate::error::Error;
use crate::types::{Action, Price, PriceLevel, Side, Size};

/// Price and size at the top of one side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookQuote {
    /// Best price
    pub price: Price,
    /// Size resting at the best price
    pub size: Size,
}

impl From<&PriceLevel> for BookQuote {
    fn from(level: &PriceLevel) -> Self {
        Self {
            price: level.price,
            size: level.size,
        }
    }
}

/// Map key for a price. `-0.0` and `0.0` share a key.
fn price_key(price: Price) -> u64 {
    (price + 0.0).to_bits()
}

/// Result of applying a partial snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum PartialOutcome {
    /// The book was empty and has been rebuilt from the snapshot
    Rebuilt,
    /// The book already held levels; nothing was applied and the returned
    /// plan must be replayed as ordinary deltas
    Reconcile(Reconciliation),
}

/// Incremental operations that turn the current book into a fresh snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Levels only in the current book (stored values)
    pub deletes: Vec<PriceLevel>,
    /// Levels only in the snapshot
    pub inserts: Vec<PriceLevel>,
    /// Levels in both whose size or id changed (snapshot values)
    pub updates: Vec<PriceLevel>,
}

impl Reconciliation {
    /// Check if the snapshot matches the book exactly
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty() && self.updates.is_empty()
    }

    /// Batches in replay order: deletes, inserts, updates
    pub fn into_batches(self) -> [(Action, Vec<PriceLevel>); 3] {
        [
            (Action::Delete, self.deletes),
            (Action::Insert, self.inserts),
            (Action::Update, self.updates),
        ]
    }
}

/// Market-by-level order book for a single symbol.
///
/// # Design Decisions
///
/// 1. **Arena plus indexes**: levels live in one map keyed by price; the two
///    ladders only hold prices. A price rests on at most one side.
///
/// 2. **Positions, not iterators**: every mutation reports the 1-based depth
///    it touched so bounded views can be derived without rescanning.
///
/// 3. **Edge-detected quotes**: [`best_quote_changed`] latches the quote it
///    observed, so callers see each top-of-book change once.
///
/// # Thread Safety
///
/// Not internally synchronized. The cache actor is its only writer.
///
/// [`best_quote_changed`]: OrderBook::best_quote_changed
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Instrument symbol
    symbol: String,

    /// Bid prices, ascending (best = highest = last)
    bids: PriceLadder,

    /// Ask prices, descending (best = lowest = last)
    asks: PriceLadder,

    /// All resting levels by price
    levels: FxHashMap<u64, PriceLevel>,

    best_bid: Option<BookQuote>,
    best_ask: Option<BookQuote>,

    /// Quotes seen by the last `best_quote_changed` call
    last_best_bid: Option<BookQuote>,
    last_best_ask: Option<BookQuote>,
}

impl OrderBook {
    /// Create a new empty book for the given symbol
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriceLadder::new(Side::Buy),
            asks: PriceLadder::new(Side::Sell),
            levels: FxHashMap::default(),
            best_bid: None,
            best_ask: None,
            last_best_bid: None,
            last_best_ask: None,
        }
    }

    /// Get the symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Ladder for one side
    #[must_use]
    pub fn ladder(&self, side: Side) -> &PriceLadder {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn ladder_mut(&mut self, side: Side) -> &mut PriceLadder {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn refresh_best(&mut self, side: Side) {
        let quote = self
            .ladder(side)
            .best()
            .and_then(|price| self.levels.get(&price_key(price)))
            .map(BookQuote::from);
        match side {
            Side::Buy => self.best_bid = quote,
            Side::Sell => self.best_ask = quote,
        }
    }

    /// Insert a new level, returning its depth
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePrice`] if a level already rests at the price
    /// on either side.
    pub fn apply_insert(&mut self, level: PriceLevel) -> Result<usize, Error> {
        let key = price_key(level.price);
        if self.levels.contains_key(&key) {
            return Err(Error::DuplicatePrice { price: level.price });
        }

        let side = level.side;
        let position = self.ladder_mut(side).insert(level.price)?;
        self.levels.insert(key, level);

        if position == 1 {
            self.refresh_best(side);
        }
        Ok(position)
    }

    /// Remove a level, returning the depth it held and the stored level
    ///
    /// A differing level id is logged and the delete still proceeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrderNotFound`] if no level rests at the price and
    /// [`Error::SideMismatch`] if it rests on the other side.
    pub fn apply_delete(&mut self, level: &PriceLevel) -> Result<(usize, PriceLevel), Error> {
        let key = price_key(level.price);
        let stored = self
            .levels
            .get(&key)
            .ok_or(Error::OrderNotFound { price: level.price })?;

        if stored.side != level.side {
            return Err(Error::SideMismatch {
                price: level.price,
                stored: stored.side,
                incoming: level.side,
            });
        }
        if stored.id != level.id {
            let mismatch = Error::IdMismatch {
                price: level.price,
                stored: stored.id,
                incoming: level.id,
            };
            warn!(symbol = %self.symbol, error = %mismatch, "consistency warning on delete");
        }

        let position = self.ladder_mut(level.side).remove(level.price)?;
        let removed = self
            .levels
            .remove(&key)
            .ok_or(Error::OrderNotFound { price: level.price })?;

        if position == 1 {
            self.refresh_best(level.side);
        }
        Ok((position, removed))
    }

    /// Replace the size and identity of an existing level, returning its depth
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrderNotFound`] if no level rests at the price and
    /// [`Error::SideMismatch`] if the update would move it to the other side.
    pub fn apply_update(&mut self, level: PriceLevel) -> Result<usize, Error> {
        let price = level.price;
        let side = level.side;
        let stored = self
            .levels
            .get_mut(&price_key(price))
            .ok_or(Error::OrderNotFound { price })?;

        if stored.side != side {
            return Err(Error::SideMismatch {
                price,
                stored: stored.side,
                incoming: side,
            });
        }
        *stored = level;

        let position = self
            .ladder(side)
            .search(price)
            .ok_or(Error::PriceNotFound { price })?;
        if position == 1 {
            self.refresh_best(side);
        }
        Ok(position)
    }

    /// Apply a partial snapshot
    ///
    /// On an empty book the snapshot is applied directly. On a populated book
    /// nothing changes here: the returned [`Reconciliation`] must be replayed
    /// through [`apply_delete`], [`apply_insert`] and [`apply_update`] so
    /// downstream views see ordinary deltas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPartial`] for an empty snapshot on an empty book
    /// and [`Error::DuplicatePrice`] if the snapshot repeats a price.
    ///
    /// [`apply_delete`]: OrderBook::apply_delete
    /// [`apply_insert`]: OrderBook::apply_insert
    /// [`apply_update`]: OrderBook::apply_update
    pub fn apply_partial(&mut self, levels: Vec<PriceLevel>) -> Result<PartialOutcome, Error> {
        if !self.is_empty() {
            return Ok(PartialOutcome::Reconcile(self.reconcile(&levels)));
        }
        if levels.is_empty() {
            return Err(Error::EmptyPartial);
        }
        self.rebuild(levels)?;
        Ok(PartialOutcome::Rebuilt)
    }

    fn rebuild(&mut self, levels: Vec<PriceLevel>) -> Result<(), Error> {
        let mut map = FxHashMap::with_capacity_and_hasher(levels.len(), Default::default());
        let mut bid_prices = Vec::new();
        let mut ask_prices = Vec::new();

        for level in levels {
            match level.side {
                Side::Buy => bid_prices.push(level.price),
                Side::Sell => ask_prices.push(level.price),
            }
            if let Some(previous) = map.insert(price_key(level.price), level) {
                return Err(Error::DuplicatePrice {
                    price: previous.price,
                });
            }
        }

        let mut bids = PriceLadder::new(Side::Buy);
        bids.rebuild(bid_prices)?;
        let mut asks = PriceLadder::new(Side::Sell);
        asks.rebuild(ask_prices)?;

        self.bids = bids;
        self.asks = asks;
        self.levels = map;
        self.refresh_best(Side::Buy);
        self.refresh_best(Side::Sell);
        Ok(())
    }

    /// Diff the book against a snapshot.
    ///
    /// A level counts as updated when its size or its id changed. Repeated
    /// prices in the snapshot resolve to the last occurrence.
    #[must_use]
    pub fn reconcile(&self, snapshot: &[PriceLevel]) -> Reconciliation {
        let mut incoming: FxHashMap<u64, usize> =
            FxHashMap::with_capacity_and_hasher(snapshot.len(), Default::default());
        for (index, level) in snapshot.iter().enumerate() {
            incoming.insert(price_key(level.price), index);
        }

        let mut plan = Reconciliation::default();

        for side in [Side::Sell, Side::Buy] {
            for price in self.ladder(side).iter_best_first() {
                let key = price_key(price);
                let Some(stored) = self.levels.get(&key) else {
                    continue;
                };
                match incoming.get(&key).map(|&index| &snapshot[index]) {
                    Some(fresh) if fresh.side == stored.side => {
                        if fresh.size != stored.size || fresh.id != stored.id {
                            plan.updates.push(fresh.clone());
                        }
                    }
                    _ => plan.deletes.push(stored.clone()),
                }
            }
        }

        for (index, fresh) in snapshot.iter().enumerate() {
            let key = price_key(fresh.price);
            if incoming.get(&key) != Some(&index) {
                continue;
            }
            let resting_same_side = self
                .levels
                .get(&key)
                .is_some_and(|stored| stored.side == fresh.side);
            if !resting_same_side {
                plan.inserts.push(fresh.clone());
            }
        }

        plan
    }

    /// Check whether the best bid or ask moved since the last call.
    ///
    /// Latches the current quotes, so a second call without an intervening
    /// change returns `false`.
    pub fn best_quote_changed(&mut self) -> bool {
        let changed = self.best_bid != self.last_best_bid || self.best_ask != self.last_best_ask;
        self.last_best_bid = self.best_bid;
        self.last_best_ask = self.best_ask;
        changed
    }

    /// Level resting at a price
    #[must_use]
    pub fn get(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price_key(price))
    }

    /// Level at a 1-based depth on one side
    #[must_use]
    pub fn level_at(&self, side: Side, position: usize) -> Option<&PriceLevel> {
        self.ladder(side)
            .price_at(position)
            .and_then(|price| self.levels.get(&price_key(price)))
    }

    /// Levels on one side, best first
    pub fn levels(&self, side: Side) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.ladder(side)
            .iter_best_first()
            .filter_map(move |price| self.levels.get(&price_key(price)))
    }

    /// Levels for a partial message, limited to `depth` per side (0 = all).
    ///
    /// Rows come out in descending price order: asks from worst to best,
    /// then bids from best to worst.
    #[must_use]
    pub fn snapshot(&self, depth: usize) -> Vec<PriceLevel> {
        let limit = if depth == 0 { usize::MAX } else { depth };
        let mut rows: Vec<PriceLevel> = self.levels(Side::Sell).take(limit).cloned().collect();
        rows.reverse();
        rows.extend(self.levels(Side::Buy).take(limit).cloned());
        rows
    }

    /// Get the best bid
    #[must_use]
    pub fn best_bid(&self) -> Option<BookQuote> {
        self.best_bid
    }

    /// Get the best ask
    #[must_use]
    pub fn best_ask(&self) -> Option<BookQuote> {
        self.best_ask
    }

    /// Get the mid price
    ///
    /// Returns the average of best bid and best ask, or `None` if either is missing.
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// Get the spread
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// Feeds can cross for a moment between two deltas, so this is reported,
    /// not rejected.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Clear the book
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.levels.clear();
        self.best_bid = None;
        self.best_ask = None;
    }

    /// Check if the book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the number of price levels (bids, asks)
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(side: Side, price: Price, size: Size) -> PriceLevel {
        PriceLevel::new("XBTUSD", (price * 100.0) as u64, side, size, price)
    }

    fn book_with(bids: &[Price], asks: &[Price]) -> OrderBook {
        let mut book = OrderBook::new("XBTUSD");
        for &price in bids {
            book.apply_insert(level(Side::Buy, price, 10.0)).unwrap();
        }
        for &price in asks {
            book.apply_insert(level(Side::Sell, price, 10.0)).unwrap();
        }
        book
    }

    #[test]
    fn test_new_book() {
        let book = OrderBook::new("XBTUSD");
        assert_eq!(book.symbol(), "XBTUSD");
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_insert_ask_between_levels() {
        let mut book = book_with(&[], &[10001.0, 10000.0, 9998.0]);
        let depth = book.apply_insert(level(Side::Sell, 9999.0, 5.0)).unwrap();

        assert_eq!(depth, 2);
        assert_eq!(
            book.ladder(Side::Sell).as_slice(),
            &[10001.0, 10000.0, 9999.0, 9998.0]
        );
        assert_eq!(book.best_ask().unwrap().price, 9998.0);
    }

    #[test]
    fn test_insert_rejects_price_on_other_side() {
        let mut book = book_with(&[100.0], &[]);
        assert!(matches!(
            book.apply_insert(level(Side::Sell, 100.0, 1.0)),
            Err(Error::DuplicatePrice { .. })
        ));
    }

    #[test]
    fn test_delete_best_bid() {
        let mut book = book_with(&[9990.0, 9991.0, 9992.0, 9993.0, 9994.0], &[]);
        let (depth, removed) = book.apply_delete(&level(Side::Buy, 9994.0, 0.0)).unwrap();

        assert_eq!(depth, 1);
        assert_eq!(removed.price, 9994.0);
        assert_eq!(book.best_bid().unwrap().price, 9993.0);
    }

    #[test]
    fn test_delete_errors() {
        let mut book = book_with(&[100.0], &[]);
        assert!(matches!(
            book.apply_delete(&level(Side::Buy, 99.0, 0.0)),
            Err(Error::OrderNotFound { .. })
        ));
        assert!(matches!(
            book.apply_delete(&level(Side::Sell, 100.0, 0.0)),
            Err(Error::SideMismatch { .. })
        ));
        assert_eq!(book.num_levels(), (1, 0));
    }

    #[test]
    fn test_delete_with_id_mismatch_proceeds() {
        let mut book = book_with(&[100.0], &[]);
        let mut delete = level(Side::Buy, 100.0, 0.0);
        delete.id = 1;
        assert!(book.apply_delete(&delete).is_ok());
        assert!(book.is_empty());
    }

    #[test]
    fn test_update_best_size() {
        let mut book = book_with(&[100.0, 101.0], &[]);
        assert_eq!(book.apply_update(level(Side::Buy, 101.0, 42.0)).unwrap(), 1);
        assert_eq!(book.best_bid().unwrap().size, 42.0);

        assert_eq!(book.apply_update(level(Side::Buy, 100.0, 7.0)).unwrap(), 2);
        assert_eq!(book.get(100.0).unwrap().size, 7.0);
        assert!(matches!(
            book.apply_update(level(Side::Buy, 102.0, 1.0)),
            Err(Error::OrderNotFound { .. })
        ));
    }

    #[test]
    fn test_cold_partial() {
        let mut book = OrderBook::new("XBTUSD");
        let mut levels: Vec<PriceLevel> = (9995..=10001)
            .map(|p| level(Side::Sell, p as Price, 1.0))
            .collect();
        levels.extend((9990..=9994).map(|p| level(Side::Buy, p as Price, 1.0)));

        assert_eq!(book.apply_partial(levels).unwrap(), PartialOutcome::Rebuilt);
        assert_eq!(book.best_ask().unwrap().price, 9995.0);
        assert_eq!(book.best_bid().unwrap().price, 9994.0);
        assert_eq!(book.num_levels(), (5, 7));
    }

    #[test]
    fn test_cold_partial_errors() {
        let mut book = OrderBook::new("XBTUSD");
        assert!(matches!(book.apply_partial(Vec::new()), Err(Error::EmptyPartial)));

        let levels = vec![level(Side::Buy, 1.0, 1.0), level(Side::Sell, 1.0, 1.0)];
        assert!(matches!(
            book.apply_partial(levels),
            Err(Error::DuplicatePrice { .. })
        ));
        assert!(book.is_empty());
    }

    #[test]
    fn test_warm_partial_reconciliation() {
        let mut book = book_with(&[98.0, 99.0], &[101.0, 102.0]);
        let snapshot = vec![
            level(Side::Sell, 102.0, 10.0),
            level(Side::Sell, 101.0, 10.0),
            level(Side::Buy, 99.0, 10.0),
            level(Side::Buy, 97.0, 10.0),
        ];

        let PartialOutcome::Reconcile(plan) = book.apply_partial(snapshot).unwrap() else {
            panic!("expected reconciliation");
        };
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].price, 98.0);
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].price, 97.0);
        assert!(plan.updates.is_empty());
        // Nothing applied yet
        assert_eq!(book.num_levels(), (2, 2));
    }

    #[test]
    fn test_reconcile_detects_size_and_id_changes() {
        let book = book_with(&[99.0, 100.0], &[]);
        let mut replaced = level(Side::Buy, 99.0, 10.0);
        replaced.id = 7;
        let snapshot = vec![level(Side::Buy, 100.0, 3.0), replaced];

        let plan = book.reconcile(&snapshot);
        assert!(plan.deletes.is_empty() && plan.inserts.is_empty());
        assert_eq!(plan.updates.len(), 2);
    }

    #[test]
    fn test_reconcile_side_flip() {
        let book = book_with(&[100.0], &[]);
        let plan = book.reconcile(&[level(Side::Sell, 100.0, 10.0)]);
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.inserts.len(), 1);
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn test_best_quote_changed_latches() {
        let mut book = OrderBook::new("XBTUSD");
        assert!(!book.best_quote_changed());

        book.apply_insert(level(Side::Buy, 100.0, 1.0)).unwrap();
        assert!(book.best_quote_changed());
        assert!(!book.best_quote_changed());

        book.apply_insert(level(Side::Buy, 99.0, 1.0)).unwrap();
        assert!(!book.best_quote_changed());

        book.apply_update(level(Side::Buy, 100.0, 2.0)).unwrap();
        assert!(book.best_quote_changed());
    }

    #[test]
    fn test_snapshot_order_and_depth() {
        let book = book_with(&[98.0, 99.0, 100.0], &[101.0, 102.0, 103.0]);

        let prices: Vec<Price> = book.snapshot(0).iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![103.0, 102.0, 101.0, 100.0, 99.0, 98.0]);

        let prices: Vec<Price> = book.snapshot(2).iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![102.0, 101.0, 100.0, 99.0]);
    }

    #[test]
    fn test_mid_price_spread_and_crossing() {
        let mut book = book_with(&[99.0], &[101.0]);
        assert_eq!(book.mid_price(), Some(100.0));
        assert_eq!(book.spread(), Some(2.0));
        assert!(!book.is_crossed());

        book.apply_insert(level(Side::Buy, 102.0, 1.0)).unwrap();
        assert!(book.is_crossed());
    }

    #[test]
    fn test_clear() {
        let mut book = book_with(&[99.0], &[101.0]);
        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.get(99.0), None);
    }
}
