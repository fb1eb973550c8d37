//! Public handle of a distribution channel.
//!
//! [`Distributor`] is cheap to clone: every clone drives the same dispatch
//! loop. Mutations of the subscriber set travel through the loop's queue as
//! probes, so they are ordered with respect to published messages.
//!
//! # Example
//!
//! ```rust,no_run
//! use feed_cache::cancel::CancelToken;
//! use feed_cache::channel::Distributor;
//! use feed_cache::config::ChannelConfig;
//!
//! # async fn example() -> feed_cache::Result<()> {
//! let channel: Distributor<String> =
//!     Distributor::new("orderBookL2_25", &ChannelConfig::default(), CancelToken::never());
//! channel.start()?;
//!
//! let (session, mut queue) = channel.subscribe().await?;
//! channel.publish("hello".to_string(), None).await?;
//! assert_eq!(queue.recv().await.as_deref(), Some("hello"));
//!
//! channel.unsubscribe(session).await?;
//! channel.close()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::dispatcher::{Dispatcher, Envelope};
use super::{Payload, SessionId};
use crate::actor::Actor;
use crate::cancel::CancelToken;
use crate::config::ChannelConfig;
use crate::error::Error;

struct Inner<T: Payload> {
    actor: Actor<Dispatcher<T>>,
    subscriber_capacity: usize,
    next_session: AtomicU64,
}

/// Fan-out channel relaying published messages to subscribers and children
pub struct Distributor<T: Payload> {
    inner: Arc<Inner<T>>,
}

impl<T: Payload> Clone for Distributor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Payload> fmt::Debug for Distributor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distributor")
            .field("name", &self.name())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<T: Payload> Distributor<T> {
    /// Create a channel in the `Created` stage
    pub fn new(name: impl Into<String>, config: &ChannelConfig, cancel: CancelToken) -> Self {
        let name = name.into();
        let dispatcher = Dispatcher::new(name.clone(), config.delivery_timeout());
        Self {
            inner: Arc::new(Inner {
                actor: Actor::new(name, dispatcher, config.queue_capacity(), cancel),
                subscriber_capacity: config.subscriber_capacity(),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        self.inner.actor.name()
    }

    /// Check if the dispatch loop was started and not closed
    pub fn is_running(&self) -> bool {
        self.inner.actor.is_running()
    }

    /// Check if two handles drive the same channel
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn next_session(&self) -> SessionId {
        SessionId::new(self.inner.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Spawn the dispatch loop
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on every call after the first.
    pub fn start(&self) -> Result<(), Error> {
        self.inner.actor.start()
    }

    /// Close the channel.
    ///
    /// Queued messages are still dispatched; then every subscriber queue is
    /// closed. Child channels are left open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] before `start` and [`Error::AlreadyClosed`]
    /// on repeated calls.
    pub fn close(&self) -> Result<(), Error> {
        self.inner.actor.stop()
    }

    /// Publish a message to every subscriber and child, or to one session
    ///
    /// Waits while the channel's queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationClosed`] once the channel is closed.
    pub async fn publish(&self, message: T, target: Option<SessionId>) -> Result<(), Error> {
        self.inner.actor.send(Envelope { message, target }).await
    }

    /// Register a leaf subscriber
    ///
    /// The returned queue yields `None` once the subscriber is evicted,
    /// unsubscribed, or the channel closes.
    pub async fn subscribe(&self) -> Result<(SessionId, mpsc::Receiver<T>), Error> {
        let session = self.next_session();
        let (tx, rx) = mpsc::channel(self.inner.subscriber_capacity);
        self.inner
            .actor
            .query(move |dispatcher| dispatcher.add_subscriber(session, tx))
            .await?;
        Ok((session, rx))
    }

    /// Remove a leaf subscriber, returning whether it was registered
    pub async fn unsubscribe(&self, session: SessionId) -> Result<bool, Error> {
        self.inner
            .actor
            .query(move |dispatcher| dispatcher.remove_subscriber(session))
            .await
    }

    /// Relay every broadcast of this channel into `child`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelfRelay`] when `child` is this channel.
    pub async fn connect_child(&self, child: &Distributor<T>) -> Result<SessionId, Error> {
        if self.same_channel(child) {
            return Err(Error::SelfRelay(self.name().to_string()));
        }
        let session = self.next_session();
        let child = child.clone();
        self.inner
            .actor
            .query(move |dispatcher| dispatcher.add_child(session, child))
            .await?;
        Ok(session)
    }

    /// Stop relaying to a child, returning whether it was connected
    pub async fn disconnect_child(&self, session: SessionId) -> Result<bool, Error> {
        self.inner
            .actor
            .query(move |dispatcher| dispatcher.remove_child(session))
            .await
    }

    /// Number of leaf subscribers, after everything queued so far
    pub async fn subscriber_count(&self) -> Result<usize, Error> {
        self.inner
            .actor
            .query(|dispatcher| dispatcher.subscriber_count())
            .await
    }

    /// Number of child channels, after everything queued so far
    pub async fn child_count(&self) -> Result<usize, Error> {
        self.inner
            .actor
            .query(|dispatcher| dispatcher.child_count())
            .await
    }
}
