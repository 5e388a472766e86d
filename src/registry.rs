use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::handler::Handler;

/// Builds a fresh handler instance inside an isolated execution context.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

static HANDLERS: Lazy<RwLock<HashMap<String, HandlerFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Error from handler registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler is already registered under '{0}'")]
    AlreadyRegistered(String),
}

/// Register a handler factory under `name`.
///
/// Source-referenced modules select their handler by this name. The table
/// is process-wide; registering the same name twice is rejected rather
/// than silently replacing the earlier handler.
///
/// # Panics
///
/// Panics if the registry lock is poisoned.
pub fn register<F, H>(name: &str, factory: F) -> Result<(), RegistryError>
where
    F: Fn() -> H + Send + Sync + 'static,
    H: Handler + 'static,
{
    let mut handlers = HANDLERS.write().unwrap();
    if handlers.contains_key(name) {
        return Err(RegistryError::AlreadyRegistered(name.to_string()));
    }
    handlers.insert(
        name.to_string(),
        Arc::new(move || Box::new(factory()) as Box<dyn Handler>),
    );
    Ok(())
}

/// Look up the factory registered under `name`.
///
/// # Panics
///
/// Panics if the registry lock is poisoned.
pub fn factory(name: &str) -> Option<HandlerFactory> {
    HANDLERS.read().unwrap().get(name).cloned()
}

/// Names of all registered handlers.
///
/// # Panics
///
/// Panics if the registry lock is poisoned.
pub fn names() -> Vec<String> {
    HANDLERS.read().unwrap().keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EventPublisher, HandlerError};
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn run(
            &self,
            _args: Value,
            _publisher: &dyn EventPublisher,
        ) -> Result<Value, HandlerError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn register_and_look_up() {
        register("registry-test-noop", || NoopHandler).unwrap();
        assert!(factory("registry-test-noop").is_some());
        assert!(names().contains(&"registry-test-noop".to_string()));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        register("registry-test-dup", || NoopHandler).unwrap();
        let err = register("registry-test-dup", || NoopHandler).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn unknown_name_yields_nothing() {
        assert!(factory("registry-test-unknown").is_none());
    }
}
