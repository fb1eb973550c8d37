//! Configuration for caches and distribution channels.
//!
//! This module provides [`CacheConfig`] and [`ChannelConfig`], builder-style
//! settings fixed at construction time.

use std::time::Duration;

/// Default capacity of actor command queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default capacity of each leaf subscriber's outbound queue
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// How long a dispatch loop waits on one slow subscriber before evicting it
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of trades retained by the trade history cache
pub const DEFAULT_TRADE_WINDOW: usize = 200;

/// Settings for a distribution channel
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use feed_cache::config::ChannelConfig;
///
/// let config = ChannelConfig::new()
///     .with_subscriber_capacity(16)
///     .with_delivery_timeout(Duration::from_millis(500));
/// assert_eq!(config.subscriber_capacity(), 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Capacity of the channel's own command queue
    queue_capacity: usize,

    /// Capacity of each subscriber queue
    subscriber_capacity: usize,

    /// Per-subscriber delivery timeout
    delivery_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    /// Create a channel configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the command queue capacity (minimum 1)
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the subscriber queue capacity (minimum 1)
    #[must_use]
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Set the per-subscriber delivery timeout
    #[must_use]
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Get the command queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Get the subscriber queue capacity
    pub fn subscriber_capacity(&self) -> usize {
        self.subscriber_capacity
    }

    /// Get the delivery timeout
    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }
}

/// Settings for one symbol/table cache
///
/// Depth 0 (the unbounded view) is always registered; [`with_depths`] adds
/// bounded top-N views.
///
/// [`with_depths`]: CacheConfig::with_depths
///
/// # Example
///
/// ```rust
/// use feed_cache::config::CacheConfig;
///
/// let config = CacheConfig::new("XBTUSD", "orderBookL2").with_depths([25, 10]);
/// assert_eq!(config.depths(), vec![0, 10, 25]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Instrument symbol
    symbol: String,

    /// Base table name
    table: String,

    /// Bounded depths (0 excluded)
    depths: Vec<usize>,

    /// Capacity of the cache command queue
    queue_capacity: usize,

    /// Trades retained by the trade history cache
    trade_window: usize,

    /// Settings shared by every depth channel
    channel: ChannelConfig,
}

impl CacheConfig {
    /// Create a cache configuration for a symbol and table
    pub fn new(symbol: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            table: table.into(),
            depths: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            trade_window: DEFAULT_TRADE_WINDOW,
            channel: ChannelConfig::default(),
        }
    }

    /// Register bounded depth views
    ///
    /// Zero and repeated depths are ignored.
    #[must_use]
    pub fn with_depths(mut self, depths: impl IntoIterator<Item = usize>) -> Self {
        for depth in depths {
            if depth > 0 && !self.depths.contains(&depth) {
                self.depths.push(depth);
            }
        }
        self.depths.sort_unstable();
        self
    }

    /// Set the command queue capacity (minimum 1)
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the trade history window (minimum 1)
    #[must_use]
    pub fn with_trade_window(mut self, len: usize) -> Self {
        self.trade_window = len.max(1);
        self
    }

    /// Set the channel configuration used for every depth view
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Get the symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the base table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All registered depths, ascending, starting with 0
    pub fn depths(&self) -> Vec<usize> {
        std::iter::once(0).chain(self.depths.iter().copied()).collect()
    }

    /// Get the command queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Get the trade history window
    pub fn trade_window(&self) -> usize {
        self.trade_window
    }

    /// Get the channel configuration
    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channel_config() {
        let config = ChannelConfig::new();
        assert_eq!(config.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.subscriber_capacity(), DEFAULT_SUBSCRIBER_CAPACITY);
        assert_eq!(config.delivery_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_default_cache_config() {
        let config = CacheConfig::new("XBTUSD", "orderBookL2");
        assert_eq!(config.symbol(), "XBTUSD");
        assert_eq!(config.table(), "orderBookL2");
        assert_eq!(config.depths(), vec![0]);
        assert_eq!(config.trade_window(), DEFAULT_TRADE_WINDOW);
    }

    #[test]
    fn test_depths_are_deduplicated() {
        let config = CacheConfig::new("XBTUSD", "orderBookL2").with_depths([25, 0, 10, 25]);
        assert_eq!(config.depths(), vec![0, 10, 25]);
    }

    #[test]
    fn test_builder_pattern() {
        let config = CacheConfig::new("XBTUSD", "trade")
            .with_queue_capacity(0)
            .with_trade_window(50)
            .with_channel(ChannelConfig::new().with_delivery_timeout(Duration::from_secs(1)));

        assert_eq!(config.queue_capacity(), 1);
        assert_eq!(config.trade_window(), 50);
        assert_eq!(config.channel().delivery_timeout(), Duration::from_secs(1));
    }
}
