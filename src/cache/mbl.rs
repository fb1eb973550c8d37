//! Market-by-level order book cache.
//!
//! Applies `orderBookL2`-style messages to an [`OrderBook`] and publishes the
//! unbounded stream plus one bounded top-N stream per configured depth.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::CacheVariant;
use crate::cancel::CancelToken;
use crate::channel::Distributor;
use crate::config::CacheConfig;
use crate::error::Error;
use crate::orderbook::{BookOp, DepthView, OrderBook, PartialOutcome};
use crate::types::messages::table_for_depth;
use crate::types::{Action, MblMessage, PriceLevel};

/// Order book cache state
#[derive(Debug)]
pub struct MblCache {
    table: String,
    book: OrderBook,
    views: Vec<DepthView>,
    channels: BTreeMap<usize, Distributor<MblMessage>>,
}

impl MblCache {
    /// Create an empty book with one view and one channel per depth
    pub fn new(config: &CacheConfig, cancel: CancelToken) -> Self {
        let mut views = Vec::new();
        let mut channels = BTreeMap::new();
        for depth in config.depths() {
            let view = DepthView::new(config.table(), depth);
            channels.insert(
                depth,
                Distributor::new(view.table(), config.channel(), cancel.clone()),
            );
            views.push(view);
        }

        Self {
            table: config.table().to_string(),
            book: OrderBook::new(config.symbol()),
            views,
            channels,
        }
    }

    /// Current book
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Base table name
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn apply_partial(&mut self, levels: Vec<PriceLevel>) -> Result<(), Error> {
        match self.book.apply_partial(levels)? {
            PartialOutcome::Rebuilt => {
                let partials: Vec<(usize, MblMessage)> = self
                    .views
                    .iter_mut()
                    .map(|view| {
                        view.reset();
                        (view.depth(), view.partial(&self.book))
                    })
                    .collect();
                for (depth, message) in partials {
                    self.publish(depth, message).await;
                }
                debug!(
                    cache = %self.table,
                    symbol = %self.book.symbol(),
                    levels = ?self.book.num_levels(),
                    "book rebuilt from partial"
                );
                self.observe_quote();
                Ok(())
            }
            PartialOutcome::Reconcile(plan) => {
                debug!(
                    cache = %self.table,
                    symbol = %self.book.symbol(),
                    deletes = plan.deletes.len(),
                    inserts = plan.inserts.len(),
                    updates = plan.updates.len(),
                    "reconciling partial against live book"
                );
                for (action, levels) in plan.into_batches() {
                    if !levels.is_empty() {
                        self.apply_delta(action, levels).await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Apply a delta batch, then publish whatever was applied, even on error
    async fn apply_delta(&mut self, action: Action, levels: Vec<PriceLevel>) -> Result<(), Error> {
        let result = self.apply_levels(action, levels);
        self.flush().await;
        self.observe_quote();
        result
    }

    fn apply_levels(&mut self, action: Action, levels: Vec<PriceLevel>) -> Result<(), Error> {
        for level in levels {
            let op = match action {
                Action::Insert => {
                    let position = self.book.apply_insert(level.clone())?;
                    BookOp::new(action, level, position)
                }
                Action::Update => {
                    let position = self.book.apply_update(level.clone())?;
                    BookOp::new(action, level, position)
                }
                Action::Delete => {
                    // Publish the stored level; deletes may omit the size
                    let (position, removed) = self.book.apply_delete(&level)?;
                    BookOp::new(action, removed, position)
                }
                Action::Partial => {
                    return Err(Error::InvalidAction {
                        table: self.table.clone(),
                        action,
                    })
                }
            };

            for view in &mut self.views {
                view.record(&op, &self.book);
            }
        }
        Ok(())
    }

    async fn flush(&mut self) {
        for view in &mut self.views {
            if view.is_idle() {
                continue;
            }
            let messages = view.take_messages();
            let Some(channel) = self.channels.get(&view.depth()) else {
                continue;
            };
            for message in messages {
                if let Err(err) = channel.publish(message, None).await {
                    warn!(channel = %channel.name(), error = %err, "publish failed");
                }
            }
        }
    }

    async fn publish(&self, depth: usize, message: MblMessage) {
        if let Some(channel) = self.channels.get(&depth) {
            if let Err(err) = channel.publish(message, None).await {
                warn!(channel = %channel.name(), error = %err, "publish failed");
            }
        }
    }

    fn observe_quote(&mut self) {
        if !self.book.best_quote_changed() {
            return;
        }
        let bid = self.book.best_bid();
        let ask = self.book.best_ask();
        debug!(
            symbol = %self.book.symbol(),
            bid = ?bid.map(|q| q.price),
            bid_size = ?bid.map(|q| q.size),
            ask = ?ask.map(|q| q.price),
            ask_size = ?ask.map(|q| q.size),
            "top of book changed"
        );
        if self.book.is_crossed() {
            warn!(
                symbol = %self.book.symbol(),
                bid = ?bid.map(|q| q.price),
                ask = ?ask.map(|q| q.price),
                "book is crossed"
            );
        }
    }
}

impl CacheVariant for MblCache {
    type Message = MblMessage;

    fn channels(&self) -> &BTreeMap<usize, Distributor<MblMessage>> {
        &self.channels
    }

    async fn handle_input(&mut self, message: MblMessage) -> Result<(), Error> {
        match message.action {
            Action::Partial => self.apply_partial(message.data).await,
            action => self.apply_delta(action, message.data).await,
        }
    }

    fn snapshot(&self, depth: usize) -> MblMessage {
        MblMessage::new(
            table_for_depth(&self.table, depth),
            Action::Partial,
            self.book.snapshot(depth),
        )
    }
}
