//! cimq-query: query engine over the instrumentation subsystem
//!
//! Connections own a dedicated session thread and answer queries synchronously.
//! The dispatcher runs connection-less queries on pooled blocking threads and hands
//! back futures. Every native result goes through the marshaler before it leaves
//! the engine.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod marshal;

pub use cimq_exec::{Backend, MemoryBackend, NativeObject, NativeValue};
pub use cimq_types::{Namespace, Record, ResultSet, Value};
pub use config::EngineConfig;
pub use connection::Connection;
pub use dispatcher::{DispatchHandle, Dispatcher};
pub use engine::Engine;
pub use error::EngineError;
pub use marshal::{marshal_rows, parse_cim_datetime};
