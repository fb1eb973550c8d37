//! Cooperative cancellation for actor loops.
//!
//! A [`CancelHandle`] flips a `tokio::sync::watch` flag; every loop holding a
//! [`CancelToken`] from the same pair exits at its next scheduling point.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected handle and token
///
/// # Example
///
/// ```rust
/// let (handle, token) = feed_cache::cancel::cancellation();
/// assert!(!token.is_cancelled());
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

/// Trigger side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel every token created from this pair
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Another token bound to this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Pends forever if every handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
