//! Async query dispatcher
//!
//! Runs connection-less queries. Each dispatch opens its own session inside its own
//! execution context on a pooled blocking thread, queries, and closes again. The
//! caller gets a future immediately.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use cimq_exec::{Backend, context};
use cimq_types::{Namespace, ResultSet};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::marshal::marshal_rows;

/// Pending result of a dispatched query
///
/// Dropping the handle does not cancel the query; it still runs to completion
/// and its result is discarded.
#[must_use = "dropping the handle discards the query result"]
#[derive(Debug)]
pub struct DispatchHandle {
    task: JoinHandle<Result<ResultSet, EngineError>>,
}

impl DispatchHandle {
    /// Whether the query has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for DispatchHandle {
    type Output = Result<ResultSet, EngineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let joined = ready!(Pin::new(&mut self.task).poll(cx));
        Poll::Ready(
            joined
                .map_err(|e| EngineError::Worker(format!("dispatch task failed: {e}")))
                .and_then(|result| result),
        )
    }
}

/// Connection-less query entry point
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    permits: Arc<Semaphore>,
    runtime: Handle,
}

impl Dispatcher {
    /// Create a dispatcher bound to the current tokio runtime
    ///
    /// # Errors
    /// Returns [`EngineError::Config`] if the configuration is invalid or no tokio
    /// runtime is running.
    pub fn new(backend: Arc<dyn Backend>, config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| EngineError::Config(format!("dispatcher requires a tokio runtime: {e}")))?;

        Ok(Self {
            backend,
            permits: Arc::new(Semaphore::new(config.max_concurrent_queries)),
            runtime,
        })
    }

    /// Submit `query` against `namespace`
    ///
    /// Returns at once. Completion order across dispatches is unspecified.
    #[instrument(skip(self, namespace, query), fields(namespace = %namespace, query = %query))]
    pub fn dispatch(&self, namespace: Namespace, query: &str) -> DispatchHandle {
        let backend = Arc::clone(&self.backend);
        let permits = Arc::clone(&self.permits);
        let query = query.to_string();

        let task = self.runtime.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Worker(e.to_string()))?;

            tokio::task::spawn_blocking(move || run_transient(&*backend, &namespace, &query))
                .await
                .map_err(|e| EngineError::Worker(format!("blocking query task failed: {e}")))?
        });

        debug!("query dispatched");
        DispatchHandle { task }
    }

    /// Queries currently allowed to start before the cap is reached
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Open, query and close within one execution context on the current thread
fn run_transient(
    backend: &dyn Backend,
    namespace: &Namespace,
    query: &str,
) -> Result<ResultSet, EngineError> {
    let rows = context::with_context(backend, || {
        let session = backend.connect(namespace)?;
        let rows = session.execute(query)?;
        drop(session);
        Ok::<_, EngineError>(rows)
    })
    .inspect_err(|e| warn!(namespace = %namespace, query, error = %e, "dispatched query failed"))?;

    debug!(namespace = %namespace, query, rows = rows.len(), "dispatched query executed");
    marshal_rows(rows)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cimq_exec::{MemoryBackend, NativeObject, NativeValue};

    use super::*;

    const QUERY: &str = "SELECT Caption FROM Win32_OperatingSystem";

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(
            MemoryBackend::new()
                .with_rows(
                    r"root\cimv2",
                    QUERY,
                    vec![NativeObject::new("Win32_OperatingSystem")
                        .with("Caption", NativeValue::String("Microsoft Windows 11 Pro".to_string()))],
                )
                .with_delay(r"root\cimv2", QUERY, Duration::from_millis(20)),
        )
    }

    fn cimv2() -> Namespace {
        Namespace::new(r"root\cimv2").unwrap()
    }

    #[test]
    fn test_requires_runtime() {
        let result = Dispatcher::new(backend(), &EngineConfig::default());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatch_runs_in_own_context() {
        let backend = backend();
        let dispatcher = Dispatcher::new(backend.clone(), &EngineConfig::default()).unwrap();

        let result = dispatcher.dispatch(cimv2(), QUERY).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(backend.context_inits(), 1);
        assert_eq!(backend.context_teardowns(), 1);
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_handle_still_runs() {
        let backend = backend();
        let dispatcher = Dispatcher::new(backend.clone(), &EngineConfig::default()).unwrap();

        drop(dispatcher.dispatch(cimv2(), QUERY));

        for _ in 0..100 {
            if backend.context_teardowns() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.queries_executed(), 1);
        assert_eq!(backend.context_teardowns(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatch_error_taxonomy() {
        let dispatcher = Dispatcher::new(backend(), &EngineConfig::default()).unwrap();

        let err = dispatcher
            .dispatch(Namespace::new(r"root\nowhere").unwrap(), QUERY)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Connection { .. }));

        let err = dispatcher.dispatch(cimv2(), "SELECT * FROM Nope").await.unwrap_err();
        assert!(matches!(err, EngineError::Query { .. }));
    }
}
