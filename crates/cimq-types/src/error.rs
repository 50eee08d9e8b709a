//! Error types for cimq-types

use thiserror::Error;

/// Errors raised by the data model and its text codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Namespace string was empty
    #[error("namespace must not be empty")]
    EmptyNamespace,

    /// Result set could not be serialized
    #[error("failed to encode result set: {0}")]
    Encode(String),

    /// Text was not a valid serialized result set
    #[error("failed to decode result set: {0}")]
    Decode(String),
}
