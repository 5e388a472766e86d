use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

use crate::error::TaskError;

/// Ordered stream of progress events from one execution.
///
/// Single consumer, no fan-out. The stream closes exactly when the
/// execution's completion handle settles; `next()` then returns `None`
/// once the buffered events are drained.
pub struct EventStream<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> EventStream<E> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<E>) -> Self {
        Self { rx }
    }

    /// A stream that was never wired to an execution: already closed.
    pub(crate) fn closed() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self { rx }
    }

    /// Next event, or `None` once the stream is closed and drained.
    pub async fn next(&mut self) -> Option<E> {
        self.rx.recv().await
    }
}

/// One-shot handle to an execution's terminal signal.
///
/// Settles exactly once, with the final value or the fault that ended the
/// execution. Await it to observe the outcome; the caller's thread is
/// never blocked before that point.
pub struct CompletionHandle<R> {
    rx: oneshot::Receiver<Result<R, TaskError>>,
}

impl<R> CompletionHandle<R> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<R, TaskError>>) -> Self {
        Self { rx }
    }
}

impl<R> Future for CompletionHandle<R> {
    type Output = Result<R, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Other(
                "execution was dropped before settling".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
