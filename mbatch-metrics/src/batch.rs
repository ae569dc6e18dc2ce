use serde::{Deserialize, Serialize};

use crate::record::{MetricCategory, MetricRecord};

/// The payload expected by the ingestion backend.
///
/// A batch holds an ordered list of records per [`MetricCategory`]. Categories without records
/// are omitted from the serialized payload:
///
/// ```json
/// {
///   "gauge": [{"metric": "Application.average", "timestamp": 12000, "value": 20, "dimensions": {}}],
///   "counter": [{"metric": "Application.counter", "timestamp": 12000, "value": 3, "dimensions": {}}]
/// }
/// ```
///
/// Batches produced by the [`BatchAggregator`](crate::BatchAggregator) never contain two records
/// with the same timestamp, metric name and dimensions within one category.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Batch {
    /// Gauge records, averaged per merge key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gauge: Vec<MetricRecord>,
    /// Counter records, summed per merge key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counter: Vec<MetricRecord>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records of the given category.
    pub fn get(&self, category: MetricCategory) -> &[MetricRecord] {
        match category {
            MetricCategory::Gauge => &self.gauge,
            MetricCategory::Counter => &self.counter,
        }
    }

    /// Appends a record to the given category without merging.
    pub fn push(&mut self, category: MetricCategory, record: MetricRecord) {
        match category {
            MetricCategory::Gauge => self.gauge.push(record),
            MetricCategory::Counter => self.counter.push(record),
        }
    }

    /// Returns the gauge records.
    pub fn gauges(&self) -> &[MetricRecord] {
        &self.gauge
    }

    /// Returns the counter records.
    pub fn counters(&self) -> &[MetricRecord] {
        &self.counter
    }

    /// Returns the total number of records.
    pub fn len(&self) -> usize {
        self.gauge.len() + self.counter.len()
    }

    /// Returns `true` if the batch contains no records.
    pub fn is_empty(&self) -> bool {
        self.gauge.is_empty() && self.counter.is_empty()
    }

    /// Iterates all records along with their category, gauges first.
    pub fn iter(&self) -> impl Iterator<Item = (MetricCategory, &MetricRecord)> {
        let gauges = self.gauge.iter().map(|r| (MetricCategory::Gauge, r));
        let counters = self.counter.iter().map(|r| (MetricCategory::Counter, r));
        gauges.chain(counters)
    }

    /// Serializes the payload into a compact JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serializes the payload into an indented JSON string.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
