use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::handler::{EventPublisher, HandlerError};
use crate::protocol::{ArgsSnapshot, Message};
use crate::registry;
use crate::resolver;

/// The work a task definition describes, stripped to what marshaling needs.
pub(crate) enum WorkSpec<R, A> {
    Inline {
        behavior: fn(A) -> Result<R, HandlerError>,
    },
    Source {
        path: PathBuf,
    },
}

impl<R, A> Clone for WorkSpec<R, A> {
    fn clone(&self) -> Self {
        match self {
            Self::Inline { behavior } => Self::Inline { behavior: *behavior },
            Self::Source { path } => Self::Source { path: path.clone() },
        }
    }
}

type PayloadFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>>>>;

/// A self-contained program fragment, runnable inside an isolated
/// execution context.
///
/// Everything the context needs is owned by the payload: the behavior (a
/// plain function, or a handler factory plus its resolved configuration)
/// and the raw-argument fallback. Running it decodes the argument
/// snapshot, drives the logic, forwards `publish` calls as `Published`
/// messages, and emits one `Completed` on success. Faults are not caught
/// here; they propagate to the boundary.
pub(crate) struct Payload {
    body: Box<dyn FnOnce(ArgsSnapshot, UnboundedSender<Message>) -> PayloadFuture + Send>,
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload").finish_non_exhaustive()
    }
}

impl Payload {
    fn new<F>(body: F) -> Self
    where
        F: FnOnce(ArgsSnapshot, UnboundedSender<Message>) -> PayloadFuture + Send + 'static,
    {
        Self { body: Box::new(body) }
    }

    pub(crate) fn run(self, snapshot: ArgsSnapshot, tx: UnboundedSender<Message>) -> PayloadFuture {
        (self.body)(snapshot, tx)
    }
}

/// Forwards handler `publish` calls onto the protocol channel.
struct ChannelPublisher {
    tx: UnboundedSender<Message>,
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: Value) {
        let _ = self.tx.send(Message::Published(event));
    }
}

/// Compile a task definition into a transportable payload plus an
/// immutable argument snapshot.
///
/// For source-referenced work this performs the whole preparation chain
/// up front, before any context exists: resolve the module variant, load
/// and compile its manifest, look up the registered handler, and merge
/// manifest defaults beneath the caller's arguments. Handler
/// instantiation itself happens later, inside the context.
pub(crate) async fn marshal<R, A>(
    spec: WorkSpec<R, A>,
    args: A,
) -> Result<(Payload, ArgsSnapshot), TaskError>
where
    R: Serialize + Send + 'static,
    A: Serialize + DeserializeOwned + Send + 'static,
{
    match spec {
        WorkSpec::Inline { behavior } => {
            let snapshot = ArgsSnapshot::capture(&args);
            let payload = Payload::new(move |snap, tx| {
                Box::pin(async move {
                    let args = snap.decode_or(args);
                    let result = behavior(args)?;
                    let value = serde_json::to_value(result)?;
                    let _ = tx.send(Message::Completed(value));
                    Ok(())
                })
            });
            Ok((payload, snapshot))
        }
        WorkSpec::Source { path } => {
            let module = resolver::resolve(&path).await?;
            let manifest = resolver::load_manifest(&module).await?;
            let factory = registry::factory(&manifest.handler)
                .ok_or_else(|| TaskError::HandlerNotRegistered(manifest.handler.clone()))?;

            let args = match serde_json::to_value(&args) {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "arguments are not serializable, handler receives null");
                    Value::Null
                }
            };
            let merged = merge_defaults(manifest.defaults, args);
            let snapshot = ArgsSnapshot::capture(&merged);
            let name = manifest.handler;

            let payload = Payload::new(move |snap, tx| {
                Box::pin(async move {
                    let args = snap.decode_or(merged);
                    debug!(handler = %name, "instantiating handler");
                    let handler = factory();
                    let publisher = ChannelPublisher { tx: tx.clone() };
                    let result = handler.run(args, &publisher).await?;
                    let _ = tx.send(Message::Completed(result));
                    Ok(())
                })
            });
            Ok((payload, snapshot))
        }
    }
}

/// Manifest defaults sit beneath the caller's arguments: caller keys win.
fn merge_defaults(defaults: Option<Value>, args: Value) -> Value {
    match (defaults, args) {
        (Some(Value::Object(mut base)), Value::Object(over)) => {
            for (key, value) in over {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (Some(defaults), Value::Null) => defaults,
        (_, args) => args,
    }
}
