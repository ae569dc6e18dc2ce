//! Utilities to deal with date-time types at the one-second resolution of the ingestion backend.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

/// A unix timestamp (full seconds elapsed since 1970-01-01 00:00 UTC).
///
/// Sub-second precision is always discarded by rounding towards negative infinity, so times
/// before the epoch land on the start of their second. The backend cannot represent anything
/// finer than one second, so every metric timestamp passes through this type before it is emitted.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UnixTimestamp(i64);

impl UnixTimestamp {
    /// Creates a unix timestamp from the given number of seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Creates a unix timestamp from a [`DateTime`], flooring to the full second.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use mbatch_common::time::UnixTimestamp;
    ///
    /// let datetime = Utc.timestamp_opt(12, 999_000_000).unwrap();
    /// assert_eq!(UnixTimestamp::from_datetime(datetime).as_millis(), 12_000);
    ///
    /// let datetime = Utc.timestamp_opt(-5, 500_000_000).unwrap();
    /// assert_eq!(UnixTimestamp::from_datetime(datetime).as_millis(), -5_000);
    /// ```
    pub fn from_datetime(date_time: DateTime<impl TimeZone>) -> Self {
        Self(date_time.timestamp())
    }

    /// Returns the number of seconds since the UNIX epoch start.
    pub const fn as_secs(self) -> i64 {
        self.0
    }

    /// Returns the number of milliseconds since the UNIX epoch start.
    ///
    /// Since the timestamp has full-second resolution, this is always a multiple of `1000`.
    pub const fn as_millis(self) -> i64 {
        self.0.saturating_mul(1000)
    }
}

impl fmt::Debug for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnixTimestamp({})", self.as_secs())
    }
}

/// Converts fractional unix seconds into a [`DateTime`].
///
/// Returns `None` if the value is not finite or outside of the range chrono can represent.
pub fn datetime_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }

    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
        return None;
    }

    let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Serde helpers for datetimes given either as RFC 3339 string or as fractional unix seconds.
///
/// Serialization always produces an RFC 3339 string.
///
/// # Example
///
/// ```
/// use chrono::{DateTime, Utc};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Entry {
///     #[serde(with = "mbatch_common::time::flexible")]
///     time: DateTime<Utc>,
/// }
///
/// let entry: Entry = serde_json::from_str(r#"{"time": 1700000000.25}"#).unwrap();
/// assert_eq!(entry.time.timestamp(), 1700000000);
/// ```
pub mod flexible {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    /// Serializes the datetime as RFC 3339 string.
    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    /// Deserializes a datetime from an RFC 3339 string or a number of unix seconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DateTimeVisitor)
    }

    struct DateTimeVisitor;

    impl Visitor<'_> for DateTimeVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("an RFC 3339 timestamp or a number of unix seconds")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            DateTime::parse_from_rfc3339(value)
                .map(|datetime| datetime.with_timezone(&Utc))
                .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            super::datetime_from_secs(value)
                .ok_or_else(|| E::invalid_value(de::Unexpected::Float(value), &self))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            DateTime::from_timestamp(value, 0)
                .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(value), &self))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(value), &self))
        }
    }
}
