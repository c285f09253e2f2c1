//! Result coercion into JSON-safe values
//!
//! Drivers hand back cells of unknown shape: native scalars, timestamps, or
//! untyped byte buffers whose meaning depends on the declared column type.
//! [`coerce_value`] turns each cell into a `serde_json::Value`, preferring a
//! lossy string over failing the whole result set on one malformed cell.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::Value;

use super::QueryRow;

/// Declared column types whose byte-encoded values are parsed as `f64`.
const NUMERIC_TYPES: &[&str] = &["NUMERIC", "DECIMAL", "FLOAT", "FLOAT4", "FLOAT8", "DOUBLE"];

/// A cell as scanned from the driver, before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// SQL NULL
    Null,
    /// Any temporal value, normalised to an offset-aware timestamp
    Timestamp(DateTime<FixedOffset>),
    /// Untyped byte buffer, interpreted by the declared column type
    Bytes(Vec<u8>),
    /// A driver-native value that is already JSON-representable
    Native(Value),
}

/// Whether a declared column type is treated as numeric.
pub fn is_numeric_type(declared_type: &str) -> bool {
    let upper = declared_type.to_ascii_uppercase();
    NUMERIC_TYPES.contains(&upper.as_str())
}

/// Render a timestamp in the fixed output format (RFC 3339, seconds, `Z` for UTC).
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Coerce one cell.
///
/// Rules, in order: null stays null; timestamps become fixed-format text;
/// byte buffers of numeric types parse as `f64` (falling back to their text);
/// other byte buffers decode as text; native values pass through.
pub fn coerce_value(declared_type: &str, raw: RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Timestamp(ts) => Value::String(format_timestamp(&ts)),
        RawValue::Bytes(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if is_numeric_type(declared_type) {
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::String(text))
            } else {
                Value::String(text)
            }
        }
        RawValue::Native(value) => value,
    }
}

/// Coerce a full row given `(column name, declared type, raw cell)` triples.
pub fn coerce_row<I, N, T>(cells: I) -> QueryRow
where
    I: IntoIterator<Item = (N, T, RawValue)>,
    N: Into<String>,
    T: AsRef<str>,
{
    cells
        .into_iter()
        .map(|(name, declared_type, raw)| (name.into(), coerce_value(declared_type.as_ref(), raw)))
        .collect()
}
