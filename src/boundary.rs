use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use ulid::Ulid;

use crate::error::TaskError;
use crate::marshal::Payload;
use crate::protocol::{ArgsSnapshot, Message};

/// The two channels an isolated execution context reports on: in-band
/// protocol messages, and the out-of-band fault signal.
pub(crate) struct RawMessages {
    pub messages: mpsc::UnboundedReceiver<Message>,
    pub fault: oneshot::Receiver<TaskError>,
}

/// Spawn one isolated execution context and hand it the payload plus the
/// argument snapshot.
///
/// Exactly one new OS thread per call, no pooling or reuse. The thread
/// hosts its own current-thread runtime so the logic may suspend without
/// touching the caller's runtime. Failure to spawn is reported on the
/// fault channel like any other boundary failure, so the caller observes
/// it through the completion handle rather than as an error here.
pub(crate) fn spawn(id: Ulid, payload: Payload, snapshot: ArgsSnapshot) -> RawMessages {
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (fault_tx, fault_rx) = oneshot::channel();

    let spawned = thread::Builder::new()
        .name(format!("isotask-{id}"))
        .spawn(move || {
            if let Some(fault) = run_context(payload, snapshot, msg_tx) {
                let _ = fault_tx.send(fault);
            }
        });

    match spawned {
        Ok(_handle) => {
            debug!(execution = %id, "execution context spawned");
            RawMessages {
                messages: msg_rx,
                fault: fault_rx,
            }
        }
        Err(e) => {
            error!(execution = %id, error = %e, "failed to spawn execution context");
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(TaskError::Spawn(e.to_string()));
            RawMessages {
                messages: msg_rx,
                fault: rx,
            }
        }
    }
}

/// Body of the isolated context: drive the payload to its end and report
/// any unhandled fault, including panics, which are caught here at the
/// boundary and nowhere deeper.
fn run_context(
    payload: Payload,
    snapshot: ArgsSnapshot,
    tx: mpsc::UnboundedSender<Message>,
) -> Option<TaskError> {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return Some(TaskError::Spawn(format!("context runtime: {e}"))),
    };

    match panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(payload.run(snapshot, tx))
    })) {
        Ok(Ok(())) => None,
        Ok(Err(fault)) => Some(fault),
        Err(panic) => Some(TaskError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
