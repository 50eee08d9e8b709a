//! Canonical text form of a [`ResultSet`]
//!
//! The text form is plain JSON: a result set is an array of objects whose keys
//! keep field order. Date-times are written as `{"$datetime": "<RFC 3339>"}`
//! so they survive a round trip.

use crate::error::DataError;
use crate::value::ResultSet;

/// Serialize a result set to its canonical compact text form
///
/// # Errors
/// Returns [`DataError::Encode`] if serialization fails.
pub fn encode_to_text(result: &ResultSet) -> Result<String, DataError> {
    serde_json::to_string(result).map_err(|e| DataError::Encode(e.to_string()))
}

/// Serialize a result set to indented text
///
/// # Errors
/// Returns [`DataError::Encode`] if serialization fails.
pub fn encode_to_text_pretty(result: &ResultSet) -> Result<String, DataError> {
    serde_json::to_string_pretty(result).map_err(|e| DataError::Encode(e.to_string()))
}

/// Parse text produced by [`encode_to_text`] back into a result set
///
/// # Errors
/// Returns [`DataError::Decode`] if the text is not a JSON array of objects,
/// contains duplicate keys, or carries a malformed date-time tag.
pub fn decode_from_text(text: &str) -> Result<ResultSet, DataError> {
    serde_json::from_str(text).map_err(|e| DataError::Decode(e.to_string()))
}
