//! Result marshaler
//!
//! Converts owned native rows into the uniform value model. Conversion is pure and
//! all-or-nothing: the first field that cannot be represented fails the whole
//! result set.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use cimq_exec::{NativeObject, NativeValue};
use cimq_types::{Record, ResultSet, Value};
use tracing::debug;

use crate::error::EngineError;

/// Length of CIM `DATETIME` text, `yyyymmddHHMMSS.mmmmmmsUUU`
const CIM_DATETIME_LEN: usize = 25;

/// Convert the rows of one query execution
///
/// Every record of the result exposes the union of all field names, in the order
/// they were first seen; fields a row lacks are null.
///
/// # Errors
/// Returns [`EngineError::UnsupportedType`] or [`EngineError::MalformedValue`]
/// naming the first field that could not be converted.
pub fn marshal_rows(rows: Vec<NativeObject>) -> Result<ResultSet, EngineError> {
    let records = rows
        .into_iter()
        .map(|row| marshal_object(None, row))
        .collect::<Result<Vec<_>, _>>()?;

    let records = normalize_fields(records);
    debug!(
        rows = records.len(),
        fields = records.first().map_or(0, Record::len),
        "marshaled result set"
    );
    Ok(ResultSet::from(records))
}

/// Convert one native object into a record
///
/// `path` is the field path of the object itself when it is embedded.
///
/// # Errors
/// See [`marshal_rows`].
pub fn marshal_object(path: Option<&str>, object: NativeObject) -> Result<Record, EngineError> {
    let mut record = Record::with_capacity(object.properties.len());
    for (name, value) in object.properties {
        let field = match path {
            Some(parent) => format!("{parent}.{name}"),
            None => name.clone(),
        };
        let value = marshal_value(&field, value)?;
        record.insert(name, value);
    }
    Ok(record)
}

/// Convert one native value found at `field`
///
/// # Errors
/// See [`marshal_rows`].
pub fn marshal_value(field: &str, value: NativeValue) -> Result<Value, EngineError> {
    let value = match value {
        NativeValue::Empty | NativeValue::Null => Value::Null,
        NativeValue::Bool(b) => Value::Bool(b),
        NativeValue::I1(n) => Value::Integer(n.into()),
        NativeValue::I2(n) => Value::Integer(n.into()),
        NativeValue::I4(n) => Value::Integer(n.into()),
        NativeValue::I8(n) => Value::Integer(n.into()),
        NativeValue::UI1(n) => Value::Integer(n.into()),
        NativeValue::UI2(n) => Value::Integer(n.into()),
        NativeValue::UI4(n) => Value::Integer(n.into()),
        NativeValue::UI8(n) => Value::Integer(n.into()),
        NativeValue::R4(f) => Value::Float(f.into()),
        NativeValue::R8(f) => Value::Float(f),
        NativeValue::String(s) => Value::String(s),
        NativeValue::DateTime(text) => {
            let parsed = parse_cim_datetime(&text).map_err(|detail| EngineError::MalformedValue {
                field: field.to_string(),
                detail,
            })?;
            Value::DateTime(parsed)
        }
        NativeValue::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| marshal_value(&format!("{field}[{idx}]"), item))
                .collect::<Result<_, _>>()?,
        ),
        NativeValue::Object(object) => Value::Record(marshal_object(Some(field), object)?),
        NativeValue::Unsupported { type_name } => {
            return Err(EngineError::UnsupportedType {
                field: field.to_string(),
                native_type: type_name,
            });
        }
    };
    Ok(value)
}

/// Parse CIM `DATETIME` text (`yyyymmddHHMMSS.mmmmmmsUUU`) into UTC
///
/// `sUUU` is the local offset from UTC in minutes, sign first.
///
/// # Errors
/// Returns a description of the problem if the text does not follow the layout or
/// names an impossible date or time.
pub fn parse_cim_datetime(text: &str) -> Result<DateTime<Utc>, String> {
    if text.len() != CIM_DATETIME_LEN || !text.is_ascii() {
        return Err(format!(
            "expected {CIM_DATETIME_LEN} characters in yyyymmddHHMMSS.mmmmmmsUUU form, got '{text}'"
        ));
    }
    if &text[14..15] != "." {
        return Err(format!("missing '.' before microseconds in '{text}'"));
    }

    let number = |range: std::ops::Range<usize>, what: &str| -> Result<u32, String> {
        let digits = &text[range];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid {what} '{digits}' in '{text}'"));
        }
        digits
            .parse::<u32>()
            .map_err(|e| format!("invalid {what} '{digits}' in '{text}': {e}"))
    };

    let year = number(0..4, "year")?;
    let month = number(4..6, "month")?;
    let day = number(6..8, "day")?;
    let hour = number(8..10, "hour")?;
    let minute = number(10..12, "minute")?;
    let second = number(12..14, "second")?;
    let micros = number(15..21, "microseconds")?;
    let offset = i64::from(number(22..25, "UTC offset")?);

    let offset = match &text[21..22] {
        "+" => offset,
        "-" => -offset,
        other => return Err(format!("invalid UTC offset sign '{other}' in '{text}'")),
    };

    #[allow(clippy::cast_possible_wrap)]
    let local = NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|date| date.and_hms_micro_opt(hour, minute, second, micros))
        .ok_or_else(|| format!("date or time out of range in '{text}'"))?;

    let utc = local - Duration::minutes(offset);
    Ok(utc.and_utc())
}

fn normalize_fields(records: Vec<Record>) -> Vec<Record> {
    let mut union: Vec<String> = Vec::new();
    for record in &records {
        for name in record.field_names() {
            if !union.iter().any(|known| known == name) {
                union.push(name.to_string());
            }
        }
    }

    let uniform = records
        .iter()
        .all(|record| record.field_names().eq(union.iter().map(String::as_str)));
    if uniform {
        return records;
    }

    records
        .into_iter()
        .map(|mut record| {
            let mut normalized = Record::with_capacity(union.len());
            for name in &union {
                let value = record.remove(name).unwrap_or(Value::Null);
                normalized.insert(name.clone(), value);
            }
            normalized
        })
        .collect()
}
