use std::collections::BTreeMap;
use std::fmt;

use mbatch_common::time::UnixTimestamp;
use serde::{Deserialize, Serialize};

/// Dimensions of a [`MetricRecord`].
///
/// Keys are unique and sorted, so two dimension maps compare equal regardless of the order in
/// which their entries were inserted, and serialization is deterministic.
pub type Dimensions = BTreeMap<String, String>;

/// The category of a [`MetricRecord`], determining how colliding records are merged.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    /// A point-in-time measurement, such as a duration.
    ///
    /// Colliding gauges are merged by averaging their values.
    Gauge,
    /// A cumulative count.
    ///
    /// Colliding counters are merged by summing their values.
    Counter,
}

impl MetricCategory {
    /// Returns the payload key of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Gauge => "gauge",
            MetricCategory::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metric data point as expected by the ingestion backend.
///
/// # Serialization
///
/// ```json
/// {
///   "metric": "Application.counter",
///   "timestamp": 1700000000000,
///   "value": 3,
///   "dimensions": {"action": "create", "class": "orders"}
/// }
/// ```
///
/// The timestamp is serialized in milliseconds, but always has full-second resolution. Integral
/// values are serialized as JSON integers.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MetricRecord {
    /// The metric name.
    pub metric: String,
    /// The full second in which the measurement was taken.
    #[serde(with = "millis")]
    pub timestamp: UnixTimestamp,
    /// The measured value.
    #[serde(serialize_with = "mbatch_common::serde::serialize_number")]
    pub value: f64,
    /// Dimensions for grouping and filtering in the backend.
    #[serde(default)]
    pub dimensions: Dimensions,
}

/// The records built from a single event.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltRecords {
    /// The primary record of the event.
    pub metric: MetricRecord,
    /// A counter record accompanying a timed gauge measurement.
    ///
    /// Keeps timed measurements countable. Never present for events with explicit dimensions.
    pub derived_counter: Option<MetricRecord>,
    /// The category of [`metric`](Self::metric).
    pub category: MetricCategory,
}

impl BuiltRecords {
    /// Returns all records along with their categories, primary record first.
    pub fn into_records(self) -> impl Iterator<Item = (MetricCategory, MetricRecord)> {
        let derived = self
            .derived_counter
            .map(|record| (MetricCategory::Counter, record));

        std::iter::once((self.category, self.metric)).chain(derived)
    }
}

/// Serializes a [`UnixTimestamp`] as milliseconds.
mod millis {
    use mbatch_common::time::UnixTimestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &UnixTimestamp, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.as_millis())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<UnixTimestamp, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(deserializer)?;
        Ok(UnixTimestamp::from_secs(millis.div_euclid(1000)))
    }
}
