//! Deferred results of queued requests.

use crate::error::{CoreError, CoreResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Creates a connected resolver/deferred pair.
pub(crate) fn deferred<T>() -> (Resolver<T>, Deferred<T>) {
    let (sender, receiver) = oneshot::channel();
    (Resolver { sender }, Deferred { receiver })
}

fn dropped() -> CoreError {
    CoreError::invalid_action("request was dropped before it produced a result")
}

/// Settles a [`Deferred`] exactly once.
pub(crate) struct Resolver<T> {
    sender: oneshot::Sender<CoreResult<T>>,
}

impl<T> Resolver<T> {
    /// Delivers the result. A caller that dropped its `Deferred` simply
    /// never sees it.
    pub(crate) fn resolve(self, result: CoreResult<T>) {
        let _ = self.sender.send(result);
    }
}

/// The pending result of a queued transaction.
///
/// `Deferred` is a [`Future`]; it can also be waited on from synchronous
/// code with [`wait`](Self::wait). If the request is dropped without
/// running, the deferred rejects with [`CoreError::InvalidAction`].
///
/// Dropping a `Deferred` does not cancel the request.
pub struct Deferred<T> {
    receiver: oneshot::Receiver<CoreResult<T>>,
}

impl<T> Deferred<T> {
    /// Creates a deferred that is already rejected with `error`.
    pub(crate) fn rejected(error: CoreError) -> Self {
        let (resolver, deferred) = deferred();
        resolver.resolve(Err(error));
        deferred
    }

    /// Blocks the current thread until the request has run.
    ///
    /// # Errors
    ///
    /// Returns the error the request was rejected with.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context;
    /// `.await` the deferred there instead.
    pub fn wait(self) -> CoreResult<T> {
        self.receiver.blocking_recv().unwrap_or_else(|_| Err(dropped()))
    }

    /// Returns the result if the request has already run, without
    /// blocking. The result can be taken only once.
    pub fn try_result(&mut self) -> Option<CoreResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(dropped())),
        }
    }
}

impl<T> Future for Deferred<T> {
    type Output = CoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(dropped())))
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}
