//! WMI backend
//!
//! Each execution context is a COM multithreaded-apartment membership of the
//! current thread. Process-wide COM security is set up by the first context and
//! tolerated as already done afterwards.

use cimq_types::Namespace;
use tracing::{debug, instrument};
use windows::Win32::Foundation::RPC_E_TOO_LATE;
use windows::Win32::System::Com::CoUninitialize;
use wmi::result_enumerator::IWbemClassWrapper;
use wmi::{COMLibrary, Variant, WMIConnection, WMIError};

use crate::error::BackendError;
use crate::native::{NativeObject, NativeValue};
use crate::traits::{Backend, ContextProvider, NativeSession};

/// Backend talking to the local WMI service
#[derive(Debug, Clone, Copy, Default)]
pub struct WmiBackend;

impl WmiBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ContextProvider for WmiBackend {
    fn initialize_context(&self) -> Result<(), BackendError> {
        let com = COMLibrary::without_security()
            .map_err(|e| BackendError::ContextInitialization(e.to_string()))?;

        if let Err(e) = tolerate_late_security(com.init_security()) {
            // The thread joined the MTA; leave it before reporting.
            unsafe { CoUninitialize() };
            return Err(BackendError::ContextInitialization(e.to_string()));
        }
        Ok(())
    }

    fn teardown_context(&self) {
        unsafe { CoUninitialize() };
    }
}

impl Backend for WmiBackend {
    fn name(&self) -> &'static str {
        "wmi"
    }

    #[instrument(skip(self, namespace), fields(namespace = %namespace), level = "debug")]
    fn connect(&self, namespace: &Namespace) -> Result<Box<dyn NativeSession>, BackendError> {
        // SAFETY: connect is only called inside an execution context on this thread.
        let com = unsafe { COMLibrary::assume_initialized() };
        let connection = WMIConnection::with_namespace_path(namespace.as_str(), com)
            .map_err(|e| BackendError::connection(namespace.as_str(), e.to_string()))?;

        debug!("connected to WMI namespace");
        Ok(Box::new(WmiSession { connection }))
    }
}

struct WmiSession {
    connection: WMIConnection,
}

impl NativeSession for WmiSession {
    fn execute(&self, query: &str) -> Result<Vec<NativeObject>, BackendError> {
        let rows = self
            .connection
            .exec_query_native_wrapper(query)
            .map_err(|e| BackendError::query(query, e.to_string()))?;

        // Invalid classes and properties surface while enumerating, not at submission.
        rows.map(|row| {
            let object = row.map_err(|e| BackendError::query(query, e.to_string()))?;
            convert_object(&object).map_err(|e| BackendError::query(query, e))
        })
        .collect()
    }
}

fn convert_object(object: &IWbemClassWrapper) -> Result<NativeObject, String> {
    let class = object.class().ok();
    let names = object.list_properties().map_err(|e| e.to_string())?;

    let mut properties = Vec::with_capacity(names.len());
    for name in names {
        let variant = object
            .get_property(&name)
            .map_err(|e| format!("failed to read property '{name}': {e}"))?;
        properties.push((name, convert_variant(variant)?));
    }

    Ok(NativeObject { class, properties })
}

fn convert_variant(variant: Variant) -> Result<NativeValue, String> {
    let value = match variant {
        Variant::Empty => NativeValue::Empty,
        Variant::Null => NativeValue::Null,
        Variant::String(s) if is_cim_datetime(&s) => NativeValue::DateTime(s),
        Variant::String(s) => NativeValue::String(s),
        Variant::I1(v) => NativeValue::I1(v),
        Variant::I2(v) => NativeValue::I2(v),
        Variant::I4(v) => NativeValue::I4(v),
        Variant::I8(v) => NativeValue::I8(v),
        Variant::R4(v) => NativeValue::R4(v),
        Variant::R8(v) => NativeValue::R8(v),
        Variant::Bool(v) => NativeValue::Bool(v),
        Variant::UI1(v) => NativeValue::UI1(v),
        Variant::UI2(v) => NativeValue::UI2(v),
        Variant::UI4(v) => NativeValue::UI4(v),
        Variant::UI8(v) => NativeValue::UI8(v),
        Variant::Array(items) => NativeValue::Array(
            items
                .into_iter()
                .map(convert_variant)
                .collect::<Result<_, _>>()?,
        ),
        Variant::Object(object) => NativeValue::Object(convert_object(&object)?),
        Variant::Unknown(_) => NativeValue::Unsupported {
            type_name: "VT_UNKNOWN".to_string(),
        },
        #[allow(unreachable_patterns)]
        other => NativeValue::Unsupported {
            type_name: format!("{other:?}"),
        },
    };
    Ok(value)
}

/// Process security can only be set once; later threads see `RPC_E_TOO_LATE`.
fn tolerate_late_security(result: Result<(), WMIError>) -> Result<(), WMIError> {
    match result {
        Err(WMIError::HResultError { hres }) if hres == RPC_E_TOO_LATE.0 => Ok(()),
        other => other,
    }
}

/// Strict match of the CIM `DATETIME` layout `yyyymmddHHMMSS.mmmmmmsUUU`
///
/// Intervals (`ddddddddHHMMSS.mmmmmm:000`) do not match and stay strings.
fn is_cim_datetime(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 25
        && b[..14].iter().all(u8::is_ascii_digit)
        && b[14] == b'.'
        && b[15..21].iter().all(u8::is_ascii_digit)
        && matches!(b[21], b'+' | b'-')
        && b[22..].iter().all(u8::is_ascii_digit)
}
