//! Error types for cimq-exec

use thiserror::Error;

/// Errors reported by an instrumentation backend
///
/// `detail` fields carry the subsystem's diagnostic text verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The per-thread execution context could not be established
    #[error("failed to initialize execution context: {0}")]
    ContextInitialization(String),

    /// Namespace unreachable, access denied, or malformed
    #[error("failed to connect to namespace '{namespace}': {detail}")]
    Connection {
        /// Namespace that was requested
        namespace: String,
        /// Subsystem diagnostic
        detail: String,
    },

    /// Query rejected or failed inside the subsystem
    #[error("query '{query}' failed: {detail}")]
    Query {
        /// Query text as submitted
        query: String,
        /// Subsystem diagnostic
        detail: String,
    },
}

impl BackendError {
    pub(crate) fn connection(namespace: impl Into<String>, detail: impl Into<String>) -> Self {
        BackendError::Connection {
            namespace: namespace.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn query(query: impl Into<String>, detail: impl Into<String>) -> Self {
        BackendError::Query {
            query: query.into(),
            detail: detail.into(),
        }
    }
}
