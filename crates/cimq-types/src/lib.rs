//! cimq-types: shared data model
//!
//! The uniform value model every native instrumentation result is converted into,
//! plus its canonical JSON text encoding.

pub mod codec;
pub mod error;
pub mod namespace;
pub mod value;

pub use codec::{decode_from_text, encode_to_text, encode_to_text_pretty};
pub use error::DataError;
pub use namespace::Namespace;
pub use value::{Record, ResultSet, Value};
