//! Owned copies of native instrumentation values
//!
//! Backends copy every property out of the subsystem before returning, so rows can
//! cross threads even though sessions cannot.

use serde::{Deserialize, Serialize};

/// A property value as typed by the subsystem
///
/// Variant names follow the COM `VARIANT` type tags the subsystem uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NativeValue {
    /// Property exists but was never set
    Empty,
    Null,
    Bool(bool),
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    UI1(u8),
    UI2(u16),
    UI4(u32),
    UI8(u64),
    R4(f32),
    R8(f64),
    String(String),
    /// CIM `DATETIME` text, `yyyymmddHHMMSS.mmmmmmsUUU`
    DateTime(String),
    Array(Vec<NativeValue>),
    /// Embedded instrumentation object
    Object(NativeObject),
    /// Anything the backend could not copy out
    Unsupported {
        /// Native type tag, e.g. `VT_UNKNOWN`
        type_name: String,
    },
}

impl NativeValue {
    /// Native type tag
    #[must_use]
    pub fn type_name(&self) -> String {
        let name = match self {
            NativeValue::Empty => "VT_EMPTY",
            NativeValue::Null => "VT_NULL",
            NativeValue::Bool(_) => "VT_BOOL",
            NativeValue::I1(_) => "VT_I1",
            NativeValue::I2(_) => "VT_I2",
            NativeValue::I4(_) => "VT_I4",
            NativeValue::I8(_) => "VT_I8",
            NativeValue::UI1(_) => "VT_UI1",
            NativeValue::UI2(_) => "VT_UI2",
            NativeValue::UI4(_) => "VT_UI4",
            NativeValue::UI8(_) => "VT_UI8",
            NativeValue::R4(_) => "VT_R4",
            NativeValue::R8(_) => "VT_R8",
            NativeValue::String(_) => "VT_BSTR",
            NativeValue::DateTime(_) => "CIM_DATETIME",
            NativeValue::Array(_) => "VT_ARRAY",
            NativeValue::Object(_) => "VT_UNKNOWN(object)",
            NativeValue::Unsupported { type_name } => return type_name.clone(),
        };
        name.to_string()
    }
}

/// One instance returned by the subsystem
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeObject {
    /// Class name, when the subsystem reports one
    #[serde(default)]
    pub class: Option<String>,
    /// Properties in the order the subsystem listed them
    #[serde(default)]
    pub properties: Vec<(String, NativeValue)>,
}

impl NativeObject {
    /// Create an empty object of a class
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            properties: Vec::new(),
        }
    }

    /// Append a property
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: NativeValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}
