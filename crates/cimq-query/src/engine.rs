//! Engine facade

use std::sync::Arc;

use cimq_exec::Backend;
use cimq_types::Namespace;
use tracing::info;

use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::dispatcher::{DispatchHandle, Dispatcher};
use crate::error::EngineError;

/// Entry point tying a backend to connections and the dispatcher
#[derive(Clone)]
pub struct Engine {
    backend: Arc<dyn Backend>,
    config: EngineConfig,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Create an engine on the current tokio runtime
    ///
    /// # Errors
    /// Returns [`EngineError::Config`] if `config` is invalid or no tokio runtime
    /// is running.
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> Result<Self, EngineError> {
        let dispatcher = Dispatcher::new(Arc::clone(&backend), &config)?;
        info!(
            backend = backend.name(),
            max_concurrent_queries = config.max_concurrent_queries,
            "engine started"
        );
        Ok(Self {
            backend,
            config,
            dispatcher,
        })
    }

    /// Create an engine backed by the local WMI service
    ///
    /// # Errors
    /// See [`Engine::new`].
    #[cfg(target_os = "windows")]
    pub fn wmi(config: EngineConfig) -> Result<Self, EngineError> {
        Self::new(Arc::new(cimq_exec::WmiBackend::new()), config)
    }

    /// Open a connection to `namespace`
    ///
    /// Blocks until the session is open.
    ///
    /// # Errors
    /// See [`Connection::open`].
    pub fn open_connection(&self, namespace: Namespace) -> Result<Connection, EngineError> {
        Connection::open(Arc::clone(&self.backend), namespace, &self.config)
    }

    /// Run `query` against `namespace` without a connection
    pub fn dispatch_query(&self, namespace: Namespace, query: &str) -> DispatchHandle {
        self.dispatcher.dispatch(namespace, query)
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use cimq_exec::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = Engine::new(
            Arc::new(MemoryBackend::new()),
            EngineConfig::default().with_max_concurrent_queries(0),
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_accessors() {
        let engine = Engine::new(
            Arc::new(MemoryBackend::new()),
            EngineConfig::default().with_max_concurrent_queries(3),
        )
        .unwrap();

        assert_eq!(engine.backend().name(), "memory");
        assert_eq!(engine.config().max_concurrent_queries, 3);
        assert_eq!(engine.dispatcher().available_slots(), 3);
    }
}
