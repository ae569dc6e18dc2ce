//! Serialization helpers.

use serde::ser::Serializer;

/// The largest integer that a 64-bit float represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Serializes a float as JSON integer if it has no fractional part.
///
/// Counters summed from integral amounts then appear as `3` instead of `3.0` in the payload.
/// Values outside of the exactly representable integer range, as well as fractional values, are
/// serialized as floats.
///
/// # Example
///
/// ```
/// #[derive(serde::Serialize)]
/// struct Value {
///     #[serde(serialize_with = "mbatch_common::serde::serialize_number")]
///     value: f64,
/// }
///
/// assert_eq!(serde_json::to_string(&Value { value: 3.0 }).unwrap(), r#"{"value":3}"#);
/// assert_eq!(serde_json::to_string(&Value { value: 2.5 }).unwrap(), r#"{"value":2.5}"#);
/// ```
pub fn serialize_number<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let value = *value;
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        serializer.serialize_i64(value as i64)
    } else {
        serializer.serialize_f64(value)
    }
}
