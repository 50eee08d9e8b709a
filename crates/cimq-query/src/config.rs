//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Tunables for connections and the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on dispatched queries running at the same time
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    /// Name prefix of connection session threads
    #[serde(default = "default_session_thread_prefix")]
    pub session_thread_prefix: String,
}

fn default_max_concurrent_queries() -> usize {
    8
}

fn default_session_thread_prefix() -> String {
    "cimq-session".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            session_thread_prefix: default_session_thread_prefix(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_concurrent_queries(mut self, max: usize) -> Self {
        self.max_concurrent_queries = max;
        self
    }

    #[must_use]
    pub fn with_session_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_thread_prefix = prefix.into();
        self
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    /// Returns [`EngineError::Config`] if the concurrency cap is zero or the thread
    /// prefix is blank.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_concurrent_queries == 0 {
            return Err(EngineError::Config(
                "max_concurrent_queries must be greater than 0".to_string(),
            ));
        }
        if self.session_thread_prefix.trim().is_empty() {
            return Err(EngineError::Config(
                "session_thread_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
