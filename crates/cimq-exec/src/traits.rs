//! Backend traits

use cimq_types::Namespace;

use crate::error::BackendError;
use crate::native::NativeObject;

/// Per-thread initialization required before any native call
///
/// Implementations are driven by [`crate::context`]; they never track nesting
/// themselves.
pub trait ContextProvider {
    /// Prepare the current thread for native calls
    ///
    /// # Errors
    /// Returns [`BackendError::ContextInitialization`] if the thread cannot be prepared.
    fn initialize_context(&self) -> Result<(), BackendError>;

    /// Undo [`ContextProvider::initialize_context`] on the current thread
    fn teardown_context(&self);
}

/// An instrumentation subsystem
pub trait Backend: ContextProvider + Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Open a native session to a namespace
    ///
    /// Must be called inside an active context on the current thread. The returned
    /// session is bound to this thread.
    ///
    /// # Errors
    /// Returns [`BackendError::Connection`] if the namespace cannot be reached.
    fn connect(&self, namespace: &Namespace) -> Result<Box<dyn NativeSession>, BackendError>;
}

/// A native session bound to one namespace
///
/// Not `Send`: a session lives and dies on the thread that opened it. Dropping the
/// session releases the native handle.
pub trait NativeSession {
    /// Execute query text verbatim and return every row in subsystem order
    ///
    /// # Errors
    /// Returns [`BackendError::Query`] if the subsystem rejects the query or fails
    /// while producing rows. No partial results are returned.
    fn execute(&self, query: &str) -> Result<Vec<NativeObject>, BackendError>;
}
