//! Dispatch loop state for a [`Distributor`](super::Distributor).
//!
//! The dispatcher is the only owner of the subscriber and child sets. It is
//! mutated either by published envelopes or by probes the distributor sends
//! through the same queue.

use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::distributor::Distributor;
use super::{Payload, SessionId};
use crate::actor::Handler;
use crate::error::Error;

/// A message plus its optional single recipient
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    /// Payload
    pub message: T,
    /// Deliver only to this session when set
    pub target: Option<SessionId>,
}

/// Subscriber and child sets owned by one dispatch loop
#[derive(Debug)]
pub struct Dispatcher<T: Payload> {
    name: String,
    delivery_timeout: Duration,
    subscribers: FxHashMap<SessionId, mpsc::Sender<T>>,
    children: FxHashMap<SessionId, Distributor<T>>,
}

impl<T: Payload> Dispatcher<T> {
    pub(crate) fn new(name: impl Into<String>, delivery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            delivery_timeout,
            subscribers: FxHashMap::default(),
            children: FxHashMap::default(),
        }
    }

    /// Number of leaf subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of child channels
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn add_subscriber(&mut self, session: SessionId, queue: mpsc::Sender<T>) {
        self.subscribers.insert(session, queue);
        debug!(channel = %self.name, %session, "subscriber added");
    }

    /// Dropping the sender closes the subscriber's queue
    pub(crate) fn remove_subscriber(&mut self, session: SessionId) -> bool {
        let removed = self.subscribers.remove(&session).is_some();
        if removed {
            debug!(channel = %self.name, %session, "subscriber removed");
        }
        removed
    }

    pub(crate) fn add_child(&mut self, session: SessionId, child: Distributor<T>) {
        debug!(channel = %self.name, %session, child = %child.name(), "child connected");
        self.children.insert(session, child);
    }

    pub(crate) fn remove_child(&mut self, session: SessionId) -> bool {
        self.children.remove(&session).is_some()
    }

    async fn deliver(
        &self,
        session: SessionId,
        queue: &mpsc::Sender<T>,
        message: T,
    ) -> Result<(), Error> {
        match tokio::time::timeout(self.delivery_timeout, queue.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::DestinationClosed),
            Err(_) => Err(Error::SubscriberTimeout { session }),
        }
    }

    fn evict_subscriber(&mut self, session: SessionId, reason: &Error) {
        if self.subscribers.remove(&session).is_some() {
            warn!(channel = %self.name, %session, error = %reason, "evicting subscriber");
        }
    }

    fn evict_child(&mut self, session: SessionId, reason: &Error) {
        if let Some(child) = self.children.remove(&session) {
            warn!(
                channel = %self.name,
                %session,
                child = %child.name(),
                error = %reason,
                "evicting child channel"
            );
        }
    }

    async fn deliver_to(&mut self, session: SessionId, message: T) {
        if let Some(queue) = self.subscribers.get(&session) {
            let result = self.deliver(session, queue, message).await;
            if let Err(err) = result {
                self.evict_subscriber(session, &err);
            }
        } else if let Some(child) = self.children.get(&session) {
            let result = child.publish(message, None).await;
            if let Err(err) = result {
                self.evict_child(session, &err);
            }
        } else {
            debug!(channel = %self.name, %session, "dropping message for unknown session");
        }
    }

    async fn broadcast(&mut self, message: T) {
        let mut failed = Vec::new();
        for (&session, queue) in &self.subscribers {
            if let Err(err) = self.deliver(session, queue, message.clone()).await {
                failed.push((session, err));
            }
        }
        for (session, err) in failed.drain(..) {
            self.evict_subscriber(session, &err);
        }

        for (&session, child) in &self.children {
            if let Err(err) = child.publish(message.clone(), None).await {
                failed.push((session, err));
            }
        }
        for (session, err) in failed {
            self.evict_child(session, &err);
        }
    }
}

impl<T: Payload> Handler for Dispatcher<T> {
    type Message = Envelope<T>;

    async fn handle(&mut self, envelope: Envelope<T>) {
        match envelope.target {
            Some(session) => self.deliver_to(session, envelope.message).await,
            None => self.broadcast(envelope.message).await,
        }
    }

    fn on_stop(&mut self) {
        info!(
            channel = %self.name,
            subscribers = self.subscribers.len(),
            children = self.children.len(),
            "channel closed"
        );
        // Children belong to whoever created them and stay open
        self.subscribers.clear();
        self.children.clear();
    }
}
