use std::io;

/// Errors produced while preparing, spawning, or settling an execution.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("no handler module found at '{0}' (tried .yaml, .json)")]
    SourceNotFound(String),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid module manifest at '{path}': {reason}")]
    Manifest { path: String, reason: String },

    #[error("no handler registered under '{0}'")]
    HandlerNotRegistered(String),

    #[error("handler failed: {0}")]
    Handler(#[from] crate::handler::HandlerError),

    #[error("execution panicked: {0}")]
    Panicked(String),

    #[error("spawn: {0}")]
    Spawn(String),

    #[error("result does not match the requested type: {0}")]
    ResultDecode(serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}
