//! Namespace connections
//!
//! A [`Connection`] owns one session worker thread. All native work for the
//! connection happens on that thread; callers block until their query has been
//! answered. Calls on one connection are serialized.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cimq_exec::{Backend, SessionWorker};
use cimq_types::{Namespace, ResultSet, encode_to_text};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::marshal::marshal_rows;

static NEXT_SESSION: AtomicUsize = AtomicUsize::new(1);

/// A session bound to one namespace
pub struct Connection {
    namespace: Namespace,
    worker: Mutex<Option<SessionWorker>>,
}

impl Connection {
    /// Open a session to `namespace` on a new session thread
    ///
    /// # Errors
    /// Returns [`EngineError::ContextInitialization`] or [`EngineError::Connection`]
    /// with the subsystem's diagnostic. The session thread has exited by then.
    #[instrument(skip(backend, namespace, config), fields(namespace = %namespace, backend = backend.name()))]
    pub fn open(
        backend: Arc<dyn Backend>,
        namespace: Namespace,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let thread_name = format!(
            "{}-{}",
            config.session_thread_prefix,
            NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
        );

        let worker = SessionWorker::spawn(backend, namespace.clone(), thread_name).map_err(|e| {
            warn!(error = %e, "failed to open connection");
            EngineError::from(e)
        })?;

        info!("connection opened");
        Ok(Self {
            namespace,
            worker: Mutex::new(Some(worker)),
        })
    }

    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Execute `query` and return the serialized result set
    ///
    /// # Errors
    /// See [`Connection::query_structured`]; also [`EngineError::Codec`] if the
    /// result cannot be encoded.
    pub fn query(&self, query: &str) -> Result<String, EngineError> {
        let result = self.query_structured(query)?;
        Ok(encode_to_text(&result)?)
    }

    /// Execute `query` and return the structured result set
    ///
    /// # Errors
    /// Returns [`EngineError::ClosedConnection`] after [`Connection::close`],
    /// [`EngineError::Query`] if the subsystem rejects the query, or a marshaling
    /// error naming the offending field. If the session thread is lost the
    /// connection is closed and [`EngineError::Worker`] is returned.
    #[instrument(skip(self, query), fields(namespace = %self.namespace, query = %query))]
    pub fn query_structured(&self, query: &str) -> Result<ResultSet, EngineError> {
        let mut guard = self.lock();
        let Some(worker) = guard.as_ref() else {
            return Err(EngineError::ClosedConnection {
                namespace: self.namespace.to_string(),
            });
        };

        let text = query.to_string();
        let rows = match worker.run(move |session| session.execute(&text)) {
            Ok(rows) => rows?,
            Err(gone) => {
                // The worker cannot serve further calls.
                guard.take();
                warn!("session worker lost, connection closed");
                return Err(gone.into());
            }
        };
        drop(guard);

        debug!(rows = rows.len(), "query executed");
        marshal_rows(rows)
    }

    /// Release the session and stop its thread
    ///
    /// Waits for an in-flight query to finish. Closing twice is a no-op.
    pub fn close(&self) {
        let worker = self.lock().take();
        if let Some(worker) = worker {
            worker.shutdown();
            info!(namespace = %self.namespace, "connection closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("namespace", &self.namespace)
            .field("closed", &self.is_closed())
            .finish()
    }
}
