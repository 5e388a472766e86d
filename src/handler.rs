use async_trait::async_trait;
use serde_json::Value;
use std::io;

/// Error produced by a handler during task execution.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("missing required argument: {0}")]
    MissingArg(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Capability handed to a handler for emitting progress events.
///
/// Each `publish` call becomes one event on the caller's stream, delivered
/// in call order, all before the execution's terminal signal.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: Value);
}

/// A handler executes the work a source-referenced module names.
///
/// The handler is instantiated inside the isolated execution context and
/// sees nothing but its decoded arguments and the publisher capability,
/// which is injected as a parameter before `run` begins. A fault returned
/// from `run` is not caught inside the context; it crosses the boundary
/// and settles the caller's completion handle as a failure.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(
        &self,
        args: Value,
        publisher: &dyn EventPublisher,
    ) -> Result<Value, HandlerError>;
}
