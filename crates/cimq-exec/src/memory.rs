//! In-memory instrumentation backend
//!
//! Serves scripted rows per namespace and query text. It enforces the same
//! threading rules as a real subsystem: sessions can only be opened inside an
//! execution context and only used on the thread that opened them. Counters expose
//! context and session lifecycles to tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use cimq_types::Namespace;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::context;
use crate::error::BackendError;
use crate::native::NativeObject;
use crate::traits::{Backend, ContextProvider, NativeSession};

/// Diagnostic returned for namespaces with no fixtures
pub const INVALID_NAMESPACE: &str = "WBEM_E_INVALID_NAMESPACE (0x8004100E)";
/// Diagnostic returned for query text with no fixture
pub const INVALID_QUERY: &str = "WBEM_E_INVALID_QUERY (0x80041017)";

/// Scripted outcome of one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFixture {
    /// Query text; matched ignoring ASCII case and whitespace runs
    pub query: String,
    /// Rows returned on success
    #[serde(default)]
    pub rows: Vec<NativeObject>,
    /// Time the query blocks before answering
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Subsystem diagnostic to fail with instead of returning rows
    #[serde(default)]
    pub error: Option<String>,
}

/// Fixture file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFile {
    /// Fixtures per namespace path
    #[serde(default)]
    pub namespaces: HashMap<String, Vec<QueryFixture>>,
    /// Make every context initialization fail with this diagnostic
    #[serde(default)]
    pub context_error: Option<String>,
}

type NamespaceFixtures = HashMap<String, QueryFixture>;

#[derive(Debug, Default)]
struct Counters {
    context_inits: AtomicUsize,
    context_teardowns: AtomicUsize,
    open_sessions: AtomicUsize,
    peak_sessions: AtomicUsize,
    queries_executed: AtomicUsize,
}

/// Backend serving scripted fixtures
#[derive(Debug, Default)]
pub struct MemoryBackend {
    namespaces: HashMap<String, Arc<NamespaceFixtures>>,
    context_error: Option<String>,
    counters: Arc<Counters>,
}

fn namespace_key(namespace: &str) -> String {
    namespace.trim().to_ascii_lowercase()
}

fn query_key(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

impl MemoryBackend {
    /// Create a backend with no namespaces
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend from a fixture file's contents
    ///
    /// # Errors
    /// Returns an error if the JSON does not match [`FixtureFile`].
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: FixtureFile = serde_json::from_str(json)?;
        Ok(Self::from_fixtures(file))
    }

    /// Load a fixture file from disk
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(std::io::Error::other)
    }

    /// Build a backend from parsed fixtures
    #[must_use]
    pub fn from_fixtures(file: FixtureFile) -> Self {
        let mut backend = Self::new();
        backend.context_error = file.context_error;
        for (namespace, fixtures) in file.namespaces {
            backend = backend.with_namespace(&namespace);
            for fixture in fixtures {
                backend.insert_fixture(&namespace, fixture);
            }
        }
        backend
    }

    /// Register a namespace without any queries
    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespaces.entry(namespace_key(namespace)).or_default();
        self
    }

    /// Answer `query` in `namespace` with `rows`
    #[must_use]
    pub fn with_rows(mut self, namespace: &str, query: &str, rows: Vec<NativeObject>) -> Self {
        self.fixture_mut(namespace, query).rows = rows;
        self
    }

    /// Delay the answer to `query`
    #[must_use]
    pub fn with_delay(mut self, namespace: &str, query: &str, delay: Duration) -> Self {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.fixture_mut(namespace, query).delay_ms = Some(millis);
        self
    }

    /// Fail `query` with a subsystem diagnostic
    #[must_use]
    pub fn with_query_error(mut self, namespace: &str, query: &str, detail: &str) -> Self {
        self.fixture_mut(namespace, query).error = Some(detail.to_string());
        self
    }

    /// Fail every context initialization
    #[must_use]
    pub fn with_context_failure(mut self, detail: &str) -> Self {
        self.context_error = Some(detail.to_string());
        self
    }

    fn insert_fixture(&mut self, namespace: &str, fixture: QueryFixture) {
        let fixtures = self.namespaces.entry(namespace_key(namespace)).or_default();
        Arc::make_mut(fixtures).insert(query_key(&fixture.query), fixture);
    }

    fn fixture_mut(&mut self, namespace: &str, query: &str) -> &mut QueryFixture {
        let fixtures = self.namespaces.entry(namespace_key(namespace)).or_default();
        Arc::make_mut(fixtures)
            .entry(query_key(query))
            .or_insert_with(|| QueryFixture {
                query: query.to_string(),
                ..QueryFixture::default()
            })
    }

    /// Number of context initializations performed
    #[must_use]
    pub fn context_inits(&self) -> usize {
        self.counters.context_inits.load(Ordering::SeqCst)
    }

    /// Number of context teardowns performed
    #[must_use]
    pub fn context_teardowns(&self) -> usize {
        self.counters.context_teardowns.load(Ordering::SeqCst)
    }

    /// Sessions currently open
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.counters.open_sessions.load(Ordering::SeqCst)
    }

    /// Highest number of sessions open at the same time
    #[must_use]
    pub fn peak_sessions(&self) -> usize {
        self.counters.peak_sessions.load(Ordering::SeqCst)
    }

    /// Queries executed successfully or not
    #[must_use]
    pub fn queries_executed(&self) -> usize {
        self.counters.queries_executed.load(Ordering::SeqCst)
    }
}

impl ContextProvider for MemoryBackend {
    fn initialize_context(&self) -> Result<(), BackendError> {
        if let Some(detail) = &self.context_error {
            return Err(BackendError::ContextInitialization(detail.clone()));
        }
        self.counters.context_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn teardown_context(&self) {
        self.counters.context_teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self, namespace), fields(namespace = %namespace), level = "debug")]
    fn connect(&self, namespace: &Namespace) -> Result<Box<dyn NativeSession>, BackendError> {
        if !context::is_active(self) {
            return Err(BackendError::ContextInitialization(
                "connect called outside an execution context".to_string(),
            ));
        }

        let fixtures = self
            .namespaces
            .get(&namespace_key(namespace.as_str()))
            .cloned()
            .ok_or_else(|| BackendError::connection(namespace.as_str(), INVALID_NAMESPACE))?;

        let open = self.counters.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_sessions.fetch_max(open, Ordering::SeqCst);
        debug!(open, "memory session opened");

        Ok(Box::new(MemorySession {
            fixtures,
            owner: thread::current().id(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MemorySession {
    fixtures: Arc<NamespaceFixtures>,
    owner: ThreadId,
    counters: Arc<Counters>,
}

impl NativeSession for MemorySession {
    fn execute(&self, query: &str) -> Result<Vec<NativeObject>, BackendError> {
        if thread::current().id() != self.owner {
            return Err(BackendError::query(
                query,
                "RPC_E_WRONG_THREAD (0x8001010E): session used outside its thread",
            ));
        }

        self.counters.queries_executed.fetch_add(1, Ordering::SeqCst);

        let fixture = self
            .fixtures
            .get(&query_key(query))
            .ok_or_else(|| BackendError::query(query, INVALID_QUERY))?;

        if let Some(ms) = fixture.delay_ms {
            thread::sleep(Duration::from_millis(ms));
        }

        match &fixture.error {
            Some(detail) => Err(BackendError::query(query, detail.clone())),
            None => Ok(fixture.rows.clone()),
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.counters.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
