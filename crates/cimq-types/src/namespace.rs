//! Instrumentation namespace paths

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Hierarchical path of an instrumentation scope, e.g. `root\cimv2`
///
/// The path is opaque to the engine; the only check is that it is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace from a path
    ///
    /// # Errors
    /// Returns [`DataError::EmptyNamespace`] if the path is empty or whitespace.
    pub fn new(path: impl Into<String>) -> Result<Self, DataError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(DataError::EmptyNamespace);
        }
        Ok(Self(path))
    }

    /// The path as given
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Namespace {
    type Error = DataError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0
    }
}
