//! Trade history cache.
//!
//! Keeps the most recent trades in a count-bounded window and relays every
//! accepted message on a single unbounded channel.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use super::CacheVariant;
use crate::cancel::CancelToken;
use crate::channel::Distributor;
use crate::config::CacheConfig;
use crate::error::Error;
use crate::types::{Action, Trade, TradeMessage};

/// Rolling window of the latest trades, oldest first
#[derive(Debug, Clone)]
pub struct TradeWindow {
    trades: VecDeque<Trade>,
    capacity: usize,
}

impl TradeWindow {
    /// Create an empty window holding at most `capacity` trades
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            trades: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of trades retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of trades held
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Append trades, evicting the oldest beyond capacity
    pub fn extend(&mut self, trades: impl IntoIterator<Item = Trade>) {
        for trade in trades {
            if self.trades.len() == self.capacity {
                self.trades.pop_front();
            }
            self.trades.push_back(trade);
        }
    }

    /// Replace the contents, keeping the newest `capacity` trades
    pub fn reset(&mut self, trades: impl IntoIterator<Item = Trade>) {
        self.trades.clear();
        self.extend(trades);
    }

    /// The `n` most recent trades, oldest first (0 = all)
    pub fn latest(&self, n: usize) -> Vec<Trade> {
        let skip = if n == 0 {
            0
        } else {
            self.trades.len().saturating_sub(n)
        };
        self.trades.iter().skip(skip).cloned().collect()
    }
}

/// Trade history cache state
#[derive(Debug)]
pub struct TradeCache {
    table: String,
    window: TradeWindow,
    channels: BTreeMap<usize, Distributor<TradeMessage>>,
}

impl TradeCache {
    /// Create an empty window with one unbounded channel.
    ///
    /// Bounded depths in `config` do not apply to trades.
    pub fn new(config: &CacheConfig, cancel: CancelToken) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(0, Distributor::new(config.table(), config.channel(), cancel));
        Self {
            table: config.table().to_string(),
            window: TradeWindow::new(config.trade_window()),
            channels,
        }
    }

    /// Current window
    pub fn window(&self) -> &TradeWindow {
        &self.window
    }
}

impl CacheVariant for TradeCache {
    type Message = TradeMessage;

    fn channels(&self) -> &BTreeMap<usize, Distributor<TradeMessage>> {
        &self.channels
    }

    async fn handle_input(&mut self, message: TradeMessage) -> Result<(), Error> {
        match message.action {
            Action::Partial => self.window.reset(message.data.iter().cloned()),
            Action::Insert => self.window.extend(message.data.iter().cloned()),
            action => {
                return Err(Error::InvalidAction {
                    table: self.table.clone(),
                    action,
                })
            }
        }
        debug!(cache = %self.table, trades = self.window.len(), "trade window updated");

        if let Some(channel) = self.channels.get(&0) {
            channel.publish(message, None).await?;
        }
        Ok(())
    }

    fn snapshot(&self, depth: usize) -> TradeMessage {
        TradeMessage::new(self.table.clone(), Action::Partial, self.window.latest(depth))
    }
}
