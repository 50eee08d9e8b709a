//! cimq-exec: instrumentation backends and execution contexts
//!
//! Provides the backend abstraction over the native instrumentation subsystem, the
//! per-thread execution context manager, and the dedicated session worker threads
//! that keep native sessions on the thread that created them.

pub mod context;
pub mod error;
pub mod memory;
pub mod native;
pub mod traits;
pub mod worker;

#[cfg(target_os = "windows")]
pub mod windows_wmi;

pub use context::{ContextGuard, enter, is_active, with_context};
pub use error::BackendError;
pub use memory::MemoryBackend;
pub use native::{NativeObject, NativeValue};
pub use traits::{Backend, ContextProvider, NativeSession};
pub use worker::{SessionWorker, WorkerGone};

#[cfg(target_os = "windows")]
pub use windows_wmi::WmiBackend;
