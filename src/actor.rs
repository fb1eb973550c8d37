//! Single-writer command loop shared by caches and distribution channels.
//!
//! An [`Actor`] owns a handler value and a bounded command queue. Exactly one
//! spawned task drains the queue, so the handler is mutated by one writer
//! without locks. The queue carries two kinds of input in one total order:
//!
//! - data messages, passed to [`Handler::handle`]
//! - probes, closures run against the handler with exclusive access whose
//!   result travels back over a oneshot
//!
//! Because probes queue behind data, a probe observes every message enqueued
//! before it and none enqueued after.
//!
//! Lifecycle is `Created -> Running -> Stopped` and single use.

use std::future::Future;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::Error;

/// State owned by an actor loop
pub(crate) trait Handler: Send + 'static {
    /// Data message type
    type Message: Send + 'static;

    /// Process one data message
    fn handle(&mut self, message: Self::Message) -> impl Future<Output = ()> + Send;

    /// Called once when the loop exits, whether by close or cancellation
    fn on_stop(&mut self) {}
}

/// Deferred closure run inside the loop
pub(crate) type Probe<H> = Box<dyn for<'a> FnOnce(&'a mut H) -> BoxFuture<'a, ()> + Send>;

pub(crate) enum Input<H: Handler> {
    Data(H::Message),
    Probe(Probe<H>),
}

fn boxed_probe<H, F>(probe: F) -> Probe<H>
where
    H: Handler,
    F: for<'a> FnOnce(&'a mut H) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(probe)
}

fn reply_probe<H, R, F>(f: F, reply: oneshot::Sender<R>) -> Probe<H>
where
    H: Handler,
    R: Send + 'static,
    F: for<'a> FnOnce(&'a mut H) -> BoxFuture<'a, R> + Send + 'static,
{
    boxed_probe(move |handler| {
        Box::pin(async move {
            // Receiver gone means the caller stopped waiting
            let _ = reply.send(f(handler).await);
        })
    })
}

enum Stage<H: Handler> {
    Created {
        handler: H,
        inbox: mpsc::Receiver<Input<H>>,
    },
    Running,
    Stopped,
}

/// A handler plus the queue and task that drive it
pub(crate) struct Actor<H: Handler> {
    name: String,
    stage: Mutex<Stage<H>>,
    sender: Mutex<Option<mpsc::Sender<Input<H>>>>,
    cancel: CancelToken,
}

impl<H: Handler> Actor<H> {
    /// Create an actor in the `Created` stage
    pub(crate) fn new(
        name: impl Into<String>,
        handler: H,
        capacity: usize,
        cancel: CancelToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            name: name.into(),
            stage: Mutex::new(Stage::Created { handler, inbox: rx }),
            sender: Mutex::new(Some(tx)),
            cancel,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the command loop. Must be called inside a Tokio runtime.
    pub(crate) fn start(&self) -> Result<(), Error> {
        let mut stage = self.stage.lock();
        match std::mem::replace(&mut *stage, Stage::Running) {
            Stage::Created { handler, inbox } => {
                tokio::spawn(run(self.name.clone(), handler, inbox, self.cancel.clone()));
                debug!(actor = %self.name, "started");
                Ok(())
            }
            previous => {
                *stage = previous;
                Err(Error::AlreadyStarted(self.name.clone()))
            }
        }
    }

    /// Close the command queue; the loop drains what is queued, then exits
    pub(crate) fn stop(&self) -> Result<(), Error> {
        let mut stage = self.stage.lock();
        match *stage {
            Stage::Created { .. } => Err(Error::NotReady(self.name.clone())),
            Stage::Stopped => Err(Error::AlreadyClosed(self.name.clone())),
            Stage::Running => {
                *stage = Stage::Stopped;
                self.sender.lock().take();
                debug!(actor = %self.name, "stopping");
                Ok(())
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(*self.stage.lock(), Stage::Running)
    }

    fn sender(&self) -> Result<mpsc::Sender<Input<H>>, Error> {
        self.sender.lock().clone().ok_or(Error::DestinationClosed)
    }

    fn running_sender(&self) -> Result<mpsc::Sender<Input<H>>, Error> {
        if !self.is_running() {
            return Err(Error::NotReady(self.name.clone()));
        }
        self.sender()
    }

    /// Enqueue a data message, waiting while the queue is full
    ///
    /// Accepted before `start`; the message is handled once the loop runs.
    pub(crate) async fn send(&self, message: H::Message) -> Result<(), Error> {
        self.sender()?
            .send(Input::Data(message))
            .await
            .map_err(|_| Error::DestinationClosed)
    }

    /// Blocking form of [`send`](Actor::send) for threads outside the runtime
    pub(crate) fn blocking_send(&self, message: H::Message) -> Result<(), Error> {
        self.sender()?
            .blocking_send(Input::Data(message))
            .map_err(|_| Error::DestinationClosed)
    }

    /// Run `f` inside the loop after everything queued so far
    pub(crate) async fn probe<R, F>(&self, f: F) -> Result<R, Error>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut H) -> BoxFuture<'a, R> + Send + 'static,
    {
        let sender = self.running_sender()?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(Input::Probe(reply_probe(f, tx)))
            .await
            .map_err(|_| Error::DestinationClosed)?;
        rx.await.map_err(|_| Error::ProbeAbandoned)
    }

    /// Blocking form of [`probe`](Actor::probe).
    ///
    /// Parks the calling thread; panics if called from inside the runtime.
    pub(crate) fn blocking_probe<R, F>(&self, f: F) -> Result<R, Error>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut H) -> BoxFuture<'a, R> + Send + 'static,
    {
        let sender = self.running_sender()?;
        let (tx, rx) = oneshot::channel();
        sender
            .blocking_send(Input::Probe(reply_probe(f, tx)))
            .map_err(|_| Error::DestinationClosed)?;
        rx.blocking_recv().map_err(|_| Error::ProbeAbandoned)
    }

    /// Run a synchronous closure inside the loop
    pub(crate) async fn query<R, F>(&self, f: F) -> Result<R, Error>
    where
        R: Send + 'static,
        F: FnOnce(&mut H) -> R + Send + 'static,
    {
        self.probe(move |handler| Box::pin(async move { f(handler) }))
            .await
    }
}

async fn run<H: Handler>(
    name: String,
    mut handler: H,
    mut inbox: mpsc::Receiver<Input<H>>,
    mut cancel: CancelToken,
) {
    loop {
        let input = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(actor = %name, "cancelled");
                break;
            }
            input = inbox.recv() => input,
        };

        match input {
            Some(Input::Data(message)) => handler.handle(message).await,
            Some(Input::Probe(probe)) => probe(&mut handler).await,
            None => break,
        }
    }

    // Queued probes are dropped here; their callers see ProbeAbandoned
    drop(inbox);
    handler.on_stop();
    debug!(actor = %name, "command loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;

    #[derive(Default)]
    struct Counter {
        total: u64,
        stopped: Option<oneshot::Sender<u64>>,
    }

    impl Handler for Counter {
        type Message = u64;

        async fn handle(&mut self, message: u64) {
            self.total += message;
        }

        fn on_stop(&mut self) {
            if let Some(tx) = self.stopped.take() {
                let _ = tx.send(self.total);
            }
        }
    }

    fn counter() -> (Actor<Counter>, oneshot::Receiver<u64>) {
        let (tx, rx) = oneshot::channel();
        let handler = Counter {
            total: 0,
            stopped: Some(tx),
        };
        (Actor::new("counter", handler, 8, CancelToken::never()), rx)
    }

    #[tokio::test]
    async fn test_lifecycle_guards() {
        let (actor, _stopped) = counter();
        assert!(matches!(actor.stop(), Err(Error::NotReady(_))));

        actor.start().unwrap();
        assert!(matches!(actor.start(), Err(Error::AlreadyStarted(_))));

        actor.stop().unwrap();
        assert!(matches!(actor.stop(), Err(Error::AlreadyClosed(_))));
        assert!(matches!(actor.start(), Err(Error::AlreadyStarted(_))));
    }

    #[tokio::test]
    async fn test_probe_sees_prior_messages() {
        let (actor, _stopped) = counter();
        actor.send(1).await.unwrap();
        actor.start().unwrap();
        actor.send(2).await.unwrap();
        actor.send(3).await.unwrap();

        let total = actor.query(|counter| counter.total).await.unwrap();
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn test_probe_requires_running() {
        let (actor, _stopped) = counter();
        let result = actor.query(|counter| counter.total).await;
        assert!(matches!(result, Err(Error::NotReady(_))));
    }

    #[tokio::test]
    async fn test_stop_drains_then_runs_on_stop() {
        let (actor, stopped) = counter();
        actor.start().unwrap();
        actor.send(5).await.unwrap();
        actor.send(7).await.unwrap();
        actor.stop().unwrap();

        assert_eq!(stopped.await.unwrap(), 12);
        assert!(matches!(actor.send(1).await, Err(Error::DestinationClosed)));
    }

    #[tokio::test]
    async fn test_cancellation_exits_loop() {
        let (handle, token) = cancellation();
        let (tx, stopped) = oneshot::channel();
        let handler = Counter {
            total: 0,
            stopped: Some(tx),
        };
        let actor = Actor::new("counter", handler, 8, token);
        actor.start().unwrap();
        actor.send(4).await.unwrap();
        let _ = actor.query(|counter| counter.total).await.unwrap();

        handle.cancel();
        assert_eq!(stopped.await.unwrap(), 4);
        assert!(matches!(actor.send(1).await, Err(Error::DestinationClosed)));
    }

    /// Holds the loop inside `handle` until the paired sender fires
    struct Gate;

    impl Handler for Gate {
        type Message = oneshot::Receiver<()>;

        async fn handle(&mut self, release: oneshot::Receiver<()>) {
            let _ = release.await;
        }
    }

    #[tokio::test]
    async fn test_cancelled_loop_abandons_queued_query() {
        let (handle, token) = cancellation();
        let actor = Actor::new("gate", Gate, 8, token);
        actor.start().unwrap();

        let (release, gate) = oneshot::channel();
        actor.send(gate).await.unwrap();

        // First poll enqueues the query behind the gated message
        let mut pending = tokio_test::task::spawn(actor.query(|_: &mut Gate| ()));
        tokio_test::assert_pending!(pending.poll());

        handle.cancel();
        let _ = release.send(());

        let result = loop {
            if let std::task::Poll::Ready(result) = pending.poll() {
                break result;
            }
            tokio::task::yield_now().await;
        };
        assert!(matches!(result, Err(Error::ProbeAbandoned)));
    }
}
