//! Dedicated session worker threads
//!
//! A [`SessionWorker`] owns one OS thread. The thread enters an execution context,
//! opens a native session, and then runs jobs against that session in submission
//! order until the worker is shut down. The session never leaves the thread.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use cimq_types::Namespace;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::context;
use crate::error::BackendError;
use crate::traits::{Backend, NativeSession};

type Job = Box<dyn FnOnce(&dyn NativeSession) + Send>;

/// The worker thread is no longer running
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("session worker thread has exited")]
pub struct WorkerGone;

/// A thread that owns one native session
pub struct SessionWorker {
    namespace: Namespace,
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl SessionWorker {
    /// Spawn a worker thread and open a session on it
    ///
    /// Blocks until the session is open or has failed to open.
    ///
    /// # Errors
    /// Returns the context or connection error raised on the worker thread. The
    /// thread has exited by the time an error is returned.
    pub fn spawn(
        backend: Arc<dyn Backend>,
        namespace: Namespace,
        thread_name: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), BackendError>>(1);
        let thread_namespace = namespace.clone();
        let thread_name = thread_name.into();

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_worker(&*backend, &thread_namespace, job_rx, &ready_tx))
            .map_err(|e| {
                BackendError::ContextInitialization(format!(
                    "failed to spawn worker thread '{thread_name}': {e}"
                ))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(namespace = %namespace, thread = %thread_name, "session worker started");
                Ok(Self {
                    namespace,
                    jobs: Some(job_tx),
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(BackendError::ContextInitialization(format!(
                    "worker thread '{thread_name}' exited before opening a session"
                )))
            }
        }
    }

    /// Namespace of the session this worker owns
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Run `job` against the session on the worker thread and wait for its result
    ///
    /// Jobs run one at a time in submission order.
    ///
    /// # Errors
    /// Returns [`WorkerGone`] if the worker has shut down or the job panicked.
    pub fn run<T, F>(&self, job: F) -> Result<T, WorkerGone>
    where
        T: Send + 'static,
        F: FnOnce(&dyn NativeSession) -> T + Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(WorkerGone)?;
        let (reply_tx, reply_rx) = mpsc::sync_channel::<T>(1);

        jobs.send(Box::new(move |session| {
            let _ = reply_tx.send(job(session));
        }))
        .map_err(|_| WorkerGone)?;

        reply_rx.recv().map_err(|_| WorkerGone)
    }

    /// Close the session and wait for the thread to tear its context down
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the channel ends the job loop.
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(namespace = %self.namespace, "session worker panicked");
            } else {
                debug!(namespace = %self.namespace, "session worker stopped");
            }
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    backend: &dyn Backend,
    namespace: &Namespace,
    jobs: Receiver<Job>,
    ready: &mpsc::SyncSender<Result<(), BackendError>>,
) {
    let result = context::with_context(backend, || {
        let session = backend.connect(namespace)?;
        let _ = ready.send(Ok(()));

        for job in jobs {
            job(&*session);
        }

        drop(session);
        Ok::<(), BackendError>(())
    });

    if let Err(e) = result {
        let _ = ready.send(Err(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::native::{NativeObject, NativeValue};

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::new().with_rows(
            r"root\cimv2",
            "SELECT Name FROM Win32_OperatingSystem",
            vec![NativeObject::new("Win32_OperatingSystem")
                .with("Name", NativeValue::String("Windows".to_string()))],
        ))
    }

    #[test]
    fn test_jobs_run_on_worker_thread() {
        let backend = backend();
        let worker = SessionWorker::spawn(
            backend.clone(),
            Namespace::new(r"root\cimv2").unwrap(),
            "test-session",
        )
        .unwrap();

        let (thread_name, rows) = worker
            .run(|session| {
                (
                    thread::current().name().map(str::to_string),
                    session.execute("SELECT Name FROM Win32_OperatingSystem"),
                )
            })
            .unwrap();

        assert_eq!(thread_name.as_deref(), Some("test-session"));
        assert_eq!(rows.unwrap().len(), 1);
        assert_eq!(backend.open_sessions(), 1);

        worker.shutdown();
        assert_eq!(backend.open_sessions(), 0);
        assert_eq!(backend.context_inits(), 1);
        assert_eq!(backend.context_teardowns(), 1);
    }

    #[test]
    fn test_connect_failure_is_reported() {
        let backend = backend();
        let result = SessionWorker::spawn(
            backend.clone(),
            Namespace::new(r"root\missing").unwrap(),
            "test-session",
        );

        assert!(matches!(result, Err(BackendError::Connection { .. })));
        assert_eq!(backend.context_inits(), 1);
        assert_eq!(backend.context_teardowns(), 1);
    }

    #[test]
    fn test_panicking_job_loses_worker() {
        let worker = SessionWorker::spawn(
            backend(),
            Namespace::new(r"root\cimv2").unwrap(),
            "test-session",
        )
        .unwrap();

        let result = worker.run(|_| -> () { panic!("job failed") });
        assert_eq!(result, Err(WorkerGone));
        assert_eq!(worker.run(|_| 1), Err(WorkerGone));
    }
}
