use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use ulid::Ulid;

use crate::boundary;
use crate::bridge::{self, ExecutionState};
use crate::error::TaskError;
use crate::handler::HandlerError;
use crate::marshal::{self, WorkSpec};
use crate::stream::{CompletionHandle, EventStream};

/// Arguments of a delay task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayArgs {
    pub ms: u64,
}

/// An immutable description of work: an inline behavior or a reference to
/// a handler module on disk, plus an argument value.
///
/// `R` is the result type, `A` the argument type, `E` the event type.
/// Executing never blocks the calling thread: the work runs on its own
/// dedicated thread and the caller gets a [`CompletionHandle`] back
/// immediately. Progress events, if the handler publishes any, arrive on
/// the stream returned by [`events`](Task::events).
///
/// Inline behavior is a plain `fn` pointer, so it cannot capture state
/// from its environment; anything the behavior needs must travel in the
/// argument value.
pub struct Task<R, A, E = ()> {
    spec: WorkSpec<R, A>,
    args: A,
    events_tx: Mutex<Option<mpsc::UnboundedSender<E>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<E>>>,
}

impl<R, A, E> Task<R, A, E>
where
    R: Serialize + DeserializeOwned + Send + 'static,
    A: Serialize + DeserializeOwned + Clone + Send + 'static,
    E: DeserializeOwned + Send + 'static,
{
    /// A task whose handler lives in a module at `path` (no extension;
    /// resolution probes the supported variants in priority order).
    pub fn from_source(path: impl Into<PathBuf>, args: A) -> Self {
        Self::new(WorkSpec::Source { path: path.into() }, args)
    }

    fn new(spec: WorkSpec<R, A>, args: A) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            spec,
            args,
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
        }
    }

    /// The event stream of this definition's first execution.
    ///
    /// Hands out the stream once; later calls return a stream that is
    /// already closed. The stream closes exactly when the first
    /// execution's completion handle settles.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> EventStream<E> {
        match self.events_rx.lock().unwrap().take() {
            Some(rx) => EventStream::new(rx),
            None => EventStream::closed(),
        }
    }

    /// Run the task in a fresh isolated execution context.
    ///
    /// Returns immediately with the completion handle; everything from
    /// marshaling to message demultiplexing happens off the caller's
    /// thread of control. Re-executing starts an independent execution
    /// with its own (unobservable) event stream.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if the internal
    /// mutex is poisoned.
    pub fn execute(&self) -> CompletionHandle<R> {
        let id = Ulid::new();
        let (done_tx, done_rx) = oneshot::channel();
        // The first execution feeds the stream created with the
        // definition; re-executions get a fresh, unobserved one.
        let events_tx = self.events_tx.lock().unwrap().take().unwrap_or_else(|| {
            let (tx, _rx) = mpsc::unbounded_channel();
            tx
        });

        debug!(execution = %id, state = ExecutionState::Created.as_str(), "execution created");
        tokio::spawn(drive(id, self.spec.clone(), self.args.clone(), events_tx, done_tx));
        CompletionHandle::new(done_rx)
    }
}

impl<R, A> Task<R, A, ()>
where
    R: Serialize + DeserializeOwned + Send + 'static,
    A: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// A task wrapping an inline behavior.
    ///
    /// The behavior must be a plain function of its arguments; a closure
    /// that captures nothing coerces to one.
    pub fn from_behavior(behavior: fn(A) -> Result<R, HandlerError>, args: A) -> Self {
        Self::new(WorkSpec::Inline { behavior }, args)
    }
}

impl Task<(), DelayArgs, ()> {
    /// A task that waits `ms` milliseconds in its own context and
    /// produces no value and no events.
    pub fn from_delay(ms: u64) -> Self {
        Task::from_behavior(
            |args: DelayArgs| {
                std::thread::sleep(Duration::from_millis(args.ms));
                Ok(())
            },
            DelayArgs { ms },
        )
    }
}

/// One execution, end to end: marshal, spawn, demultiplex, settle.
async fn drive<R, A, E>(
    id: Ulid,
    spec: WorkSpec<R, A>,
    args: A,
    events: mpsc::UnboundedSender<E>,
    done: oneshot::Sender<Result<R, TaskError>>,
) where
    R: Serialize + DeserializeOwned + Send + 'static,
    A: Serialize + DeserializeOwned + Send + 'static,
    E: DeserializeOwned + Send + 'static,
{
    debug!(execution = %id, state = ExecutionState::Spawning.as_str(), "marshaling task");
    let (payload, snapshot) = match marshal::marshal(spec, args).await {
        Ok(marshaled) => marshaled,
        Err(e) => {
            error!(execution = %id, state = ExecutionState::Failed.as_str(), error = %e, "failed to prepare execution");
            drop(events);
            let _ = done.send(Err(e));
            return;
        }
    };

    let raw = boundary::spawn(id, payload, snapshot);
    debug!(execution = %id, state = ExecutionState::Running.as_str(), "execution running");
    bridge::run(id, raw, events, done).await;
}
