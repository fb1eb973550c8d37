//! Market-by-level order book.
//!
//! This module provides the book data structures the cache actor mutates:
//!
//! - [`ladder`] - Side-aware sorted price ladder with depth positions
//! - [`book`] - Order book state, apply operations and partial reconciliation
//! - [`depth`] - Bounded top-N views synthesized from full-depth operations
//!
//! # Example
//!
//! ```rust
//! use feed_cache::orderbook::OrderBook;
//! use feed_cache::types::{PriceLevel, Side};
//!
//! let mut book = OrderBook::new("XBTUSD");
//!
//! book.apply_insert(PriceLevel::new("XBTUSD", 1, Side::Buy, 100.0, 9990.0)).unwrap();
//! book.apply_insert(PriceLevel::new("XBTUSD", 2, Side::Sell, 50.0, 9991.0)).unwrap();
//!
//! if let Some(bid) = book.best_bid() {
//!     println!("Best bid: {} @ {}", bid.size, bid.price);
//! }
//! ```

pub mod book;
pub mod depth;
pub mod ladder;

pub use book::{BookQuote, OrderBook, PartialOutcome, Reconciliation};
pub use depth::{BookOp, DepthView};
pub use ladder::PriceLadder;
