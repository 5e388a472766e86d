use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::boundary::RawMessages;
use crate::error::TaskError;
use crate::protocol::Message;

/// Lifecycle of one execution. `Completed` and `Failed` are terminal;
/// the oneshot settle makes repeating them impossible by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionState {
    Created,
    Spawning,
    Running,
    Completed,
    Failed,
}

impl ExecutionState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Demultiplex one execution's raw channels into the public event stream
/// and the single terminal settle.
///
/// `Published` values are decoded and forwarded in arrival order.
/// `Completed` is the last in-band message; a context that ends without
/// one has faulted, and the fault channel carries why. Either way the
/// event stream is closed first and the completion handle settled second,
/// exactly once.
pub(crate) async fn run<R, E>(
    id: Ulid,
    mut raw: RawMessages,
    events: mpsc::UnboundedSender<E>,
    done: oneshot::Sender<Result<R, TaskError>>,
) -> ExecutionState
where
    R: DeserializeOwned,
    E: DeserializeOwned,
{
    let mut outcome: Option<Result<R, TaskError>> = None;

    while let Some(message) = raw.messages.recv().await {
        match message {
            Message::Published(value) => match serde_json::from_value::<E>(value) {
                Ok(event) => {
                    let _ = events.send(event);
                }
                Err(e) => {
                    warn!(execution = %id, error = %e, "event did not decode, dropping it");
                }
            },
            Message::Completed(value) => {
                outcome = Some(serde_json::from_value::<R>(value).map_err(TaskError::ResultDecode));
                break;
            }
        }
    }

    let outcome = match outcome {
        Some(outcome) => outcome,
        // The context ended without a Completed: an unhandled fault.
        None => match raw.fault.await {
            Ok(fault) => Err(fault),
            Err(_) => Err(TaskError::Other(
                "execution context ended without a result".to_string(),
            )),
        },
    };

    // Close the stream before settling, never after.
    drop(events);

    let state = match &outcome {
        Ok(_) => {
            info!(execution = %id, "execution completed");
            ExecutionState::Completed
        }
        Err(e) => {
            error!(execution = %id, error = %e, "execution failed");
            ExecutionState::Failed
        }
    };
    let _ = done.send(outcome);
    state
}
