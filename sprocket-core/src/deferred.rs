//! Single-shot deferred completion
//!
//! Bridges callback-driven events into something an async caller can await.
//! [`deferred`] returns a [`Resolver`] and a [`Promise`]; the first call to
//! [`Resolver::resolve`] or [`Resolver::reject`] settles the promise and every
//! later call is ignored, so several event sources may race to complete the
//! same wait.
//!
//! ```rust
//! use sprocket_core::deferred;
//!
//! # async fn run() {
//! let (resolver, promise) = deferred::<u32, String>();
//! let racer = resolver.clone();
//!
//! tokio::spawn(async move { resolver.resolve(1) });
//! tokio::spawn(async move { racer.resolve(2) });
//!
//! let value = promise.await.unwrap();
//! assert!(value == 1 || value == 2);
//! # }
//! ```

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

/// Why a [`Promise`] did not produce a value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeferredError<E> {
    #[error("deferred rejected: {0}")]
    Rejected(E),

    /// Every resolver was dropped without settling
    #[error("deferred abandoned before completion")]
    Abandoned,
}

/// Completion side of a deferred; cheap to clone
pub struct Resolver<T, E> {
    sender: Arc<Mutex<Option<oneshot::Sender<Result<T, E>>>>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T, E> Resolver<T, E> {
    /// Settle with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns `false` if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn settle(&self, outcome: Result<T, E>) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            return false;
        };
        // The promise may already be gone; settling still counts.
        let _ = sender.send(outcome);
        true
    }
}

/// Awaitable side of a deferred
#[derive(Debug)]
pub struct Promise<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for Promise<T, E> {
    type Output = Result<T, DeferredError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(DeferredError::Rejected(error)),
            Err(_) => Err(DeferredError::Abandoned),
        })
    }
}

/// Create a linked resolver/promise pair
pub fn deferred<T, E>() -> (Resolver<T, E>, Promise<T, E>) {
    let (sender, receiver) = oneshot::channel();
    (
        Resolver {
            sender: Arc::new(Mutex::new(Some(sender))),
        },
        Promise { receiver },
    )
}
