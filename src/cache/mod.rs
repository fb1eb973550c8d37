//! Caches: one actor per symbol/table that owns derived state and publishes
//! to per-depth distribution channels.
//!
//! This module contains:
//!
//! - [`mbl`] - Market-by-level order book cache with bounded depth views
//! - [`trade`] - Rolling trade history cache
//!
//! A [`Cache`] wraps a [`CacheVariant`] in a single-writer loop. Inbound
//! messages are applied in arrival order; [`Cache::take_snapshot`] runs
//! inside the same loop, so a snapshot reflects every message sent before it.
//!
//! # Example
//!
//! ```rust,no_run
//! use feed_cache::cache::Cache;
//! use feed_cache::cancel::cancellation;
//! use feed_cache::config::CacheConfig;
//! use feed_cache::types::{Action, MblMessage, PriceLevel, Side};
//!
//! # async fn example() -> feed_cache::Result<()> {
//! let (shutdown, token) = cancellation();
//! let config = CacheConfig::new("XBTUSD", "orderBookL2").with_depths([25]);
//! let cache = Cache::order_book(&config, token);
//! cache.start()?;
//!
//! let (_session, mut top25) = cache.subscribe_with_snapshot(25).await?;
//! cache
//!     .send(MblMessage::new(
//!         "orderBookL2",
//!         Action::Insert,
//!         vec![PriceLevel::new("XBTUSD", 1, Side::Buy, 100.0, 9990.0)],
//!     ))
//!     .await?;
//!
//! while let Some(message) = top25.recv().await {
//!     println!("{}", message.to_json()?);
//! }
//! shutdown.cancel();
//! # Ok(())
//! # }
//! ```

pub mod mbl;
pub mod trade;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::actor::{Actor, Handler};
use crate::cancel::CancelToken;
use crate::channel::{Distributor, Payload, SessionId};
use crate::config::CacheConfig;
use crate::error::Error;

pub use mbl::MblCache;
pub use trade::TradeCache;

/// State and behaviour specific to one kind of cache
///
/// Implementations are driven by exactly one loop and never shared, so they
/// need no internal synchronization.
pub trait CacheVariant: Send + 'static {
    /// Inbound and outbound message type
    type Message: Payload;

    /// Distribution channels by depth; depth 0 is the unbounded stream
    fn channels(&self) -> &BTreeMap<usize, Distributor<Self::Message>>;

    /// Apply one inbound message and publish whatever it produces
    ///
    /// An error discards the rest of the message; the loop keeps running.
    fn handle_input(
        &mut self,
        message: Self::Message,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Partial message describing the current state at `depth` (0 = all)
    fn snapshot(&self, depth: usize) -> Self::Message;
}

struct CacheWorker<C> {
    name: String,
    variant: C,
}

impl<C: CacheVariant> CacheWorker<C> {
    async fn snapshot(
        &mut self,
        depth: usize,
        publish_to: Option<SessionId>,
    ) -> Result<C::Message, Error> {
        let message = self.variant.snapshot(depth);
        if let Some(session) = publish_to {
            let channel = self
                .variant
                .channels()
                .get(&depth)
                .cloned()
                .ok_or(Error::UnknownDepth(depth))?;
            channel.publish(message.clone(), Some(session)).await?;
        }
        Ok(message)
    }

    /// Register a session and queue its snapshot with no delta in between
    async fn subscribe_with_snapshot(
        &mut self,
        depth: usize,
    ) -> Result<(SessionId, mpsc::Receiver<C::Message>), Error> {
        let channel = self
            .variant
            .channels()
            .get(&depth)
            .cloned()
            .ok_or(Error::UnknownDepth(depth))?;
        let (session, queue) = channel.subscribe().await?;
        channel
            .publish(self.variant.snapshot(depth), Some(session))
            .await?;
        Ok((session, queue))
    }
}

impl<C: CacheVariant> Handler for CacheWorker<C> {
    type Message = C::Message;

    async fn handle(&mut self, message: C::Message) {
        match self.variant.handle_input(message).await {
            Ok(()) => {}
            Err(err) if err.is_structural() => {
                warn!(cache = %self.name, error = %err, "discarding rest of message");
            }
            Err(err) => warn!(cache = %self.name, error = %err, "message handling failed"),
        }
    }

    fn on_stop(&mut self) {
        for (depth, channel) in self.variant.channels() {
            if let Err(err) = channel.close() {
                debug!(cache = %self.name, depth, error = %err, "channel not closed");
            }
        }
        debug!(cache = %self.name, "cache stopped");
    }
}

/// A running (or runnable) cache and its distribution channels
pub struct Cache<C: CacheVariant> {
    name: String,
    actor: Actor<CacheWorker<C>>,
    channels: BTreeMap<usize, Distributor<C::Message>>,
}

impl<C: CacheVariant> fmt::Debug for Cache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("depths", &self.depths())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Cache<MblCache> {
    /// Order book cache with one channel per configured depth
    pub fn order_book(config: &CacheConfig, cancel: CancelToken) -> Self {
        Self::new(MblCache::new(config, cancel.clone()), config, cancel)
    }
}

impl Cache<TradeCache> {
    /// Trade history cache with a single unbounded channel
    pub fn trades(config: &CacheConfig, cancel: CancelToken) -> Self {
        Self::new(TradeCache::new(config, cancel.clone()), config, cancel)
    }
}

impl<C: CacheVariant> Cache<C> {
    /// Wrap a variant in a cache loop; nothing runs until [`start`](Cache::start)
    pub fn new(variant: C, config: &CacheConfig, cancel: CancelToken) -> Self {
        let name = format!("{}:{}", config.table(), config.symbol());
        let channels = variant.channels().clone();
        let worker = CacheWorker {
            name: name.clone(),
            variant,
        };
        Self {
            actor: Actor::new(name.clone(), worker, config.queue_capacity(), cancel),
            name,
            channels,
        }
    }

    /// Cache name (`table:symbol`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the cache loop was started and not stopped
    pub fn is_running(&self) -> bool {
        self.actor.is_running()
    }

    /// Spawn the cache loop, then every channel loop
    ///
    /// A channel that fails to start does not keep the others from starting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on every call after the first, or
    /// the first channel error once every channel has been tried.
    pub fn start(&self) -> Result<(), Error> {
        self.actor.start()?;
        let mut failure = None;
        for (depth, channel) in &self.channels {
            if let Err(err) = channel.start() {
                warn!(cache = %self.name, depth, error = %err, "channel not started");
                failure.get_or_insert(err);
            }
        }
        debug!(cache = %self.name, depths = ?self.depths(), "cache started");
        failure.map_or(Ok(()), Err)
    }

    /// Stop accepting input. Queued messages are applied, then every channel
    /// is closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] before `start` and [`Error::AlreadyClosed`]
    /// on repeated calls.
    pub fn stop(&self) -> Result<(), Error> {
        self.actor.stop()
    }

    /// Enqueue an inbound message, waiting while the queue is full
    pub async fn send(&self, message: C::Message) -> Result<(), Error> {
        self.actor.send(message).await
    }

    /// Blocking form of [`send`](Cache::send) for feed threads outside the
    /// runtime
    pub fn blocking_send(&self, message: C::Message) -> Result<(), Error> {
        self.actor.blocking_send(message)
    }

    /// Snapshot at `depth` after every message queued so far.
    ///
    /// When `publish_to` names a session of that depth's channel, the snapshot
    /// is also published to it from inside the loop, ahead of any later delta.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless running, and [`Error::UnknownDepth`]
    /// when publishing to a depth without a channel.
    pub async fn take_snapshot(
        &self,
        depth: usize,
        publish_to: Option<SessionId>,
    ) -> Result<C::Message, Error> {
        self.actor
            .probe::<Result<C::Message, Error>, _>(move |worker| {
                Box::pin(worker.snapshot(depth, publish_to))
            })
            .await?
    }

    /// Blocking form of [`take_snapshot`](Cache::take_snapshot).
    ///
    /// Must not be called from inside the runtime.
    pub fn blocking_take_snapshot(
        &self,
        depth: usize,
        publish_to: Option<SessionId>,
    ) -> Result<C::Message, Error> {
        self.actor
            .blocking_probe::<Result<C::Message, Error>, _>(move |worker| {
                Box::pin(worker.snapshot(depth, publish_to))
            })?
    }

    /// Run `f` against the variant inside the loop
    pub async fn inspect<R, F>(&self, f: F) -> Result<R, Error>
    where
        R: Send + 'static,
        F: FnOnce(&C) -> R + Send + 'static,
    {
        self.actor.query(move |worker| f(&worker.variant)).await
    }

    /// Channel registered for a depth
    pub fn channel(&self, depth: usize) -> Option<&Distributor<C::Message>> {
        self.channels.get(&depth)
    }

    /// Registered depths, ascending
    pub fn depths(&self) -> Vec<usize> {
        self.channels.keys().copied().collect()
    }

    fn require_channel(&self, depth: usize) -> Result<&Distributor<C::Message>, Error> {
        self.channel(depth).ok_or(Error::UnknownDepth(depth))
    }

    /// Subscribe to the stream of one depth
    pub async fn subscribe(
        &self,
        depth: usize,
    ) -> Result<(SessionId, mpsc::Receiver<C::Message>), Error> {
        self.require_channel(depth)?.subscribe().await
    }

    /// Subscribe and deliver a snapshot to the new session.
    ///
    /// Both steps run inside the cache loop, so the snapshot is the first
    /// message on the returned queue and every later delta applies on top of
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless running, and [`Error::UnknownDepth`]
    /// when no channel serves `depth`.
    pub async fn subscribe_with_snapshot(
        &self,
        depth: usize,
    ) -> Result<(SessionId, mpsc::Receiver<C::Message>), Error> {
        self.require_channel(depth)?;
        self.actor
            .probe::<Result<(SessionId, mpsc::Receiver<C::Message>), Error>, _>(move |worker| {
                Box::pin(worker.subscribe_with_snapshot(depth))
            })
            .await?
    }

    /// Remove a session from one depth's channel
    pub async fn unsubscribe(&self, depth: usize, session: SessionId) -> Result<bool, Error> {
        self.require_channel(depth)?.unsubscribe(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use crate::types::{Action, MblMessage, PriceLevel, Side};
    use tokio_test::assert_ok;

    fn config() -> CacheConfig {
        CacheConfig::new("XBTUSD", "orderBookL2").with_depths([2])
    }

    fn partial() -> MblMessage {
        MblMessage::new(
            "orderBookL2",
            Action::Partial,
            vec![
                PriceLevel::new("XBTUSD", 1, Side::Sell, 10.0, 10001.0),
                PriceLevel::new("XBTUSD", 2, Side::Sell, 10.0, 10000.0),
                PriceLevel::new("XBTUSD", 3, Side::Buy, 10.0, 9999.0),
            ],
        )
    }

    #[tokio::test]
    async fn test_lifecycle_guards() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        assert_eq!(cache.name(), "orderBookL2:XBTUSD");
        assert_eq!(cache.depths(), vec![0, 2]);
        assert!(matches!(cache.stop(), Err(Error::NotReady(_))));
        assert!(matches!(
            cache.take_snapshot(0, None).await,
            Err(Error::NotReady(_))
        ));

        assert_ok!(cache.start());
        assert!(matches!(cache.start(), Err(Error::AlreadyStarted(_))));
        assert_ok!(cache.stop());
        assert!(matches!(cache.stop(), Err(Error::AlreadyClosed(_))));
    }

    #[tokio::test]
    async fn test_snapshot_reflects_prior_messages() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        cache.send(partial()).await.unwrap();
        cache.start().unwrap();

        let snapshot = cache.take_snapshot(0, None).await.unwrap();
        assert_eq!(snapshot.action, Action::Partial);
        assert_eq!(snapshot.table, "orderBookL2");
        assert_eq!(snapshot.len(), 3);

        let bounded = cache.take_snapshot(2, None).await.unwrap();
        assert_eq!(bounded.table, "orderBookL2_2");
    }

    #[tokio::test]
    async fn test_subscribe_with_snapshot_delivers_partial() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        cache.start().unwrap();
        cache.send(partial()).await.unwrap();

        let (_, mut queue) = cache.subscribe_with_snapshot(2).await.unwrap();
        let first = queue.recv().await.unwrap();
        assert_eq!(first.action, Action::Partial);
        assert_eq!(first.table, "orderBookL2_2");
    }

    #[tokio::test]
    async fn test_subscribe_with_snapshot_precedes_queued_deltas() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        cache.start().unwrap();
        cache.send(partial()).await.unwrap();
        cache.take_snapshot(0, None).await.unwrap();

        // Still queued in the cache loop when the subscription is requested
        cache
            .send(MblMessage::new(
                "orderBookL2",
                Action::Delete,
                vec![PriceLevel::new("XBTUSD", 2, Side::Sell, 10.0, 10000.0)],
            ))
            .await
            .unwrap();
        let (_, mut queue) = cache.subscribe_with_snapshot(2).await.unwrap();

        let first = queue.recv().await.unwrap();
        assert_eq!(first.action, Action::Partial);
        let prices: Vec<f64> = first.data.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![10001.0, 9999.0]);

        // Nothing published before the snapshot trails it
        cache.stop().unwrap();
        while let Some(message) = queue.recv().await {
            assert_ne!(message.action, Action::Partial);
            assert!(message.data.iter().all(|l| l.price != 10000.0));
        }
    }

    #[tokio::test]
    async fn test_start_reports_prestarted_channel() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        cache.channel(2).unwrap().start().unwrap();

        assert!(matches!(cache.start(), Err(Error::AlreadyStarted(_))));
        assert!(cache.is_running());
        assert!(cache.channel(0).unwrap().is_running());

        // The remaining channels serve subscribers despite the error
        cache.send(partial()).await.unwrap();
        let (_, mut queue) = cache.subscribe_with_snapshot(0).await.unwrap();
        assert_eq!(queue.recv().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_depth() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        cache.start().unwrap();

        assert!(matches!(
            cache.subscribe(5).await,
            Err(Error::UnknownDepth(5))
        ));
        assert!(matches!(
            cache.take_snapshot(5, Some(SessionId::new(1))).await,
            Err(Error::UnknownDepth(5))
        ));
        // Unregistered depths can still be read
        assert_ok!(cache.take_snapshot(5, None).await);
    }

    #[tokio::test]
    async fn test_stop_closes_channels() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        cache.start().unwrap();
        let (_, mut queue) = cache.subscribe(0).await.unwrap();

        cache.send(partial()).await.unwrap();
        cache.stop().unwrap();

        assert_eq!(queue.recv().await.map(|m| m.action), Some(Action::Partial));
        assert!(queue.recv().await.is_none());
        assert!(matches!(
            cache.send(partial()).await,
            Err(Error::DestinationClosed)
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_cache() {
        let (handle, token) = cancellation();
        let cache = Cache::order_book(&config(), token);
        cache.start().unwrap();
        let (_, mut queue) = cache.subscribe(0).await.unwrap();

        handle.cancel();
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_inspect_reads_variant() {
        let cache = Cache::order_book(&config(), CancelToken::never());
        cache.start().unwrap();
        cache.send(partial()).await.unwrap();

        let levels = cache.inspect(|mbl| mbl.book().num_levels()).await.unwrap();
        assert_eq!(levels, (1, 2));
    }
}
