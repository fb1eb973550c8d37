//! # feed-cache
//!
//! Single-writer market-data caches with bounded depth views and fan-out
//! distribution.
//!
//! ## Features
//!
//! - **Order Book Cache** - Market-by-level book with O(log n) depth positions
//! - **Top-N Views** - Bounded `table_N` streams synthesized from full-depth
//!   deltas, including makeup inserts and deletes
//! - **Distribution Channels** - Bounded per-subscriber queues with timeout
//!   eviction and child channel trees
//! - **Trade History** - Rolling window of the latest prints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feed_cache::cache::Cache;
//! use feed_cache::cancel::cancellation;
//! use feed_cache::config::CacheConfig;
//! use feed_cache::types::{Action, MblMessage, PriceLevel, Side};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), feed_cache::Error> {
//!     let (shutdown, token) = cancellation();
//!     let config = CacheConfig::new("XBTUSD", "orderBookL2").with_depths([10, 25]);
//!     let cache = Cache::order_book(&config, token);
//!     cache.start()?;
//!
//!     // Decoded feed messages go in...
//!     cache
//!         .send(MblMessage::new(
//!             "orderBookL2",
//!             Action::Partial,
//!             vec![
//!                 PriceLevel::new("XBTUSD", 1, Side::Sell, 500.0, 10001.0),
//!                 PriceLevel::new("XBTUSD", 2, Side::Buy, 300.0, 10000.0),
//!             ],
//!         ))
//!         .await?;
//!
//!     // ...and each depth fans out to its own subscribers
//!     let (_session, mut top10) = cache.subscribe_with_snapshot(10).await?;
//!     if let Some(message) = top10.recv().await {
//!         println!("{}", message.to_json()?);
//!     }
//!
//!     shutdown.cancel();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`types`] - Feed records and the `{table, action, data}` envelope
//! - [`orderbook`] - Price ladders, book state and bounded depth views
//! - [`cache`] - Cache loops that own the state and publish per depth
//! - [`channel`] - Fan-out distribution to subscribers and child channels
//! - [`cancel`] - Cancellation shared by every loop
//! - [`config`] - Cache and channel settings
//! - [`error`] - Error types for the crate
//!
//! ## Concurrency
//!
//! Every cache and every channel runs one Tokio task that is the only writer
//! of its state. Producers talk to it over a bounded queue and wait when the
//! queue is full; reads run as closures queued behind pending data, so they
//! observe a consistent state without locks.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

mod actor;
pub mod cache;
pub mod cancel;
pub mod channel;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod types;

// Re-export main types at crate root for convenience
pub use cache::{Cache, CacheVariant, MblCache, TradeCache};
pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use channel::{Distributor, SessionId};
pub use config::{CacheConfig, ChannelConfig};
pub use error::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = CacheConfig::new("XBTUSD", "orderBookL2").with_depths([25]);
        assert_eq!(config.symbol(), "XBTUSD");
        assert_eq!(config.depths(), vec![0, 25]);
    }
}
