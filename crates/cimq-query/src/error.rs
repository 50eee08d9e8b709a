//! Error types for cimq-query

use cimq_exec::{BackendError, WorkerGone};
use cimq_types::DataError;
use thiserror::Error;

/// Errors surfaced by connections, the dispatcher and the marshaler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
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

    /// The connection was closed before the call
    #[error("connection to '{namespace}' is closed")]
    ClosedConnection {
        /// Namespace of the closed connection
        namespace: String,
    },

    /// Query rejected or failed inside the subsystem
    #[error("query '{query}' failed: {detail}")]
    Query {
        /// Query text as submitted
        query: String,
        /// Subsystem diagnostic, verbatim
        detail: String,
    },

    /// A field holds a native type with no place in the value model
    #[error("field '{field}' has unsupported native type {native_type}")]
    UnsupportedType {
        /// Field path, e.g. `Parent.Child` or `Items[2]`
        field: String,
        /// Native type tag
        native_type: String,
    },

    /// A field's native text could not be interpreted
    #[error("field '{field}' holds a malformed value: {detail}")]
    MalformedValue {
        /// Field path
        field: String,
        /// What was wrong with it
        detail: String,
    },

    /// Result text could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(String),

    /// A worker thread or blocking task was lost
    #[error("worker failure: {0}")]
    Worker(String),

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether the caller can recover by opening a new connection
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::ClosedConnection { .. })
    }

    /// The subsystem's own diagnostic, when the error carries one
    #[must_use]
    pub fn subsystem_detail(&self) -> Option<&str> {
        match self {
            EngineError::ContextInitialization(detail)
            | EngineError::Connection { detail, .. }
            | EngineError::Query { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ContextInitialization(detail) => {
                EngineError::ContextInitialization(detail)
            }
            BackendError::Connection { namespace, detail } => {
                EngineError::Connection { namespace, detail }
            }
            BackendError::Query { query, detail } => EngineError::Query { query, detail },
        }
    }
}

impl From<DataError> for EngineError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::EmptyNamespace => EngineError::Connection {
                namespace: String::new(),
                detail: err.to_string(),
            },
            DataError::Encode(detail) | DataError::Decode(detail) => EngineError::Codec(detail),
        }
    }
}

impl From<WorkerGone> for EngineError {
    fn from(err: WorkerGone) -> Self {
        EngineError::Worker(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_map_one_to_one() {
        let err: EngineError = BackendError::Query {
            query: "SELECT * FROM Nope".to_string(),
            detail: "0x80041010".to_string(),
        }
        .into();

        assert_eq!(
            err,
            EngineError::Query {
                query: "SELECT * FROM Nope".to_string(),
                detail: "0x80041010".to_string(),
            }
        );
        assert_eq!(err.subsystem_detail(), Some("0x80041010"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_closed_connection_is_recoverable() {
        let err = EngineError::ClosedConnection {
            namespace: r"root\cimv2".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.subsystem_detail(), None);
    }
}
