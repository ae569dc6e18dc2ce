//! Core functionality of merging many events into one batch.

use std::fmt;

use indexmap::IndexMap;
use indexmap::map::Entry;
use mbatch_common::time::UnixTimestamp;
use smallvec::{SmallVec, smallvec};

use crate::batch::Batch;
use crate::builder::{LogContext, RecordBuilder};
use crate::config::FormatterConfig;
use crate::event::{Event, ValidationError};
use crate::record::{Dimensions, MetricCategory, MetricRecord};

/// Identifies the records that are merged into one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RecordKey {
    timestamp: UnixTimestamp,
    metric: String,
    dimensions: Dimensions,
}

impl RecordKey {
    /// Splits a record into its merge key and value.
    fn split(record: MetricRecord) -> (Self, f64) {
        let MetricRecord {
            metric,
            timestamp,
            value,
            dimensions,
        } = record;

        let key = Self {
            timestamp,
            metric,
            dimensions,
        };

        (key, value)
    }

    fn into_record(self, value: f64) -> MetricRecord {
        MetricRecord {
            metric: self.metric,
            timestamp: self.timestamp,
            value,
            dimensions: self.dimensions,
        }
    }
}

/// Collects the values of colliding gauge records until the batch is finished.
#[derive(Clone, Debug, PartialEq)]
pub enum GaugeAccumulator {
    /// A gauge that has not collided with another record.
    Single(f64),
    /// Values of colliding gauges, pending averaging.
    Pending(SmallVec<[f64; 3]>),
}

impl GaugeAccumulator {
    /// Adds the value of a colliding record.
    ///
    /// The first collision promotes a single value to a pending sequence.
    pub fn insert(&mut self, value: f64) {
        match self {
            Self::Single(first) => *self = Self::Pending(smallvec![*first, value]),
            Self::Pending(values) => values.push(value),
        }
    }

    /// Returns the number of values collected.
    pub fn count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Pending(values) => values.len(),
        }
    }

    /// Returns the final value of the gauge.
    ///
    /// Single values are returned untouched, pending sequences are replaced by their arithmetic
    /// mean.
    pub fn finalize(&self) -> f64 {
        match self {
            Self::Single(value) => *value,
            Self::Pending(values) => {
                let sum = values.iter().fold(0.0, |sum, value| sum + value);
                sum / values.len() as f64
            }
        }
    }
}

/// Merges the records of a sequence of events into a [`Batch`].
///
/// Records are grouped by their merge key, the triple of timestamp, metric name and dimensions.
/// Colliding counters are summed, colliding gauges are collected and averaged when the batch is
/// [finished](Self::finish). The first occurrence of a key determines its position in the output.
///
/// The aggregator is owned by a single aggregation. Concurrent aggregations use separate
/// instances and do not interfere.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use mbatch_metrics::{BatchAggregator, Event, FormatterConfig, LogContext};
///
/// let config = FormatterConfig::default();
/// let context = LogContext::default();
/// let time = Utc.timestamp_opt(12, 0).unwrap();
///
/// let mut aggregator = BatchAggregator::new(&config, &context);
/// for duration in [10.0, 20.0, 30.0] {
///     let event = Event::new("/orders/create", time).with_duration(duration);
///     aggregator.push(&event).unwrap();
/// }
///
/// let batch = aggregator.finish();
/// assert_eq!(batch.gauge[0].value, 20.0);
/// assert_eq!(batch.counter[0].value, 3.0);
/// ```
pub struct BatchAggregator<'a> {
    builder: RecordBuilder<'a>,
    context: &'a LogContext,
    gauges: IndexMap<RecordKey, GaugeAccumulator>,
    counters: IndexMap<RecordKey, f64>,
    events: usize,
}

impl<'a> BatchAggregator<'a> {
    /// Creates a new aggregator.
    pub fn new(config: &'a FormatterConfig, context: &'a LogContext) -> Self {
        Self {
            builder: RecordBuilder::new(config),
            context,
            gauges: IndexMap::new(),
            counters: IndexMap::new(),
            events: 0,
        }
    }

    /// Returns the number of events pushed into this aggregator.
    pub fn event_count(&self) -> usize {
        self.events
    }

    /// Returns the number of distinct records across both categories.
    pub fn record_count(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// Builds the records of an event and merges them into the batch.
    ///
    /// The position of the event in the sequence of pushed events is reported as index in the
    /// error, in which case nothing is merged.
    pub fn push(&mut self, event: &Event) -> Result<(), ValidationError> {
        let index = self.events;
        let built = self
            .builder
            .build(event, self.context)
            .map_err(|kind| ValidationError::new(index, kind))?;

        self.events += 1;

        for (category, record) in built.into_records() {
            self.merge(category, record);
        }

        Ok(())
    }

    /// Pushes all events in order, stopping at the first invalid event.
    pub fn extend<'e, I>(&mut self, events: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = &'e Event>,
    {
        for event in events {
            self.push(event)?;
        }

        Ok(())
    }

    /// Merges a single record into the batch.
    ///
    /// If no record exists for the merge key, the record is appended.
    pub fn merge(&mut self, category: MetricCategory, record: MetricRecord) {
        let (key, value) = RecordKey::split(record);

        match category {
            MetricCategory::Counter => match self.counters.entry(key) {
                Entry::Occupied(mut entry) => {
                    mbatch_log::trace!(metric = %entry.key().metric, "merged counter record");
                    *entry.get_mut() += value;
                }
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            },
            MetricCategory::Gauge => match self.gauges.entry(key) {
                Entry::Occupied(mut entry) => {
                    mbatch_log::trace!(metric = %entry.key().metric, "merged gauge record");
                    entry.get_mut().insert(value);
                }
                Entry::Vacant(entry) => {
                    entry.insert(GaugeAccumulator::Single(value));
                }
            },
        }
    }

    /// Averages pending gauges and returns the final batch.
    pub fn finish(self) -> Batch {
        mbatch_log::debug!(
            events = self.events,
            gauges = self.gauges.len(),
            counters = self.counters.len(),
            "finished metrics batch"
        );

        let gauge = self
            .gauges
            .into_iter()
            .map(|(key, accumulator)| key.into_record(accumulator.finalize()))
            .collect();

        let counter = self
            .counters
            .into_iter()
            .map(|(key, value)| key.into_record(value))
            .collect();

        Batch { gauge, counter }
    }
}

impl fmt::Debug for BatchAggregator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(std::any::type_name::<Self>())
            .field("events", &self.events)
            .field("gauges", &self.gauges.len())
            .field("counters", &self.counters.len())
            .finish()
    }
}

/// Aggregates a sequence of events into a single [`Batch`].
///
/// Fails with the first invalid event. See [`BatchAggregator`] for the merge rules.
pub fn aggregate<'e, I>(
    config: &FormatterConfig,
    context: &LogContext,
    events: I,
) -> Result<Batch, ValidationError>
where
    I: IntoIterator<Item = &'e Event>,
{
    let mut aggregator = BatchAggregator::new(config, context);
    aggregator.extend(events)?;
    Ok(aggregator.finish())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use similar_asserts::assert_eq;

    use super::*;
    use crate::event::ValidationErrorKind;

    fn time(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, millis * 1_000_000).unwrap()
    }

    fn aggregate_default(events: &[Event]) -> Batch {
        mbatch_test::setup();
        aggregate(&FormatterConfig::default(), &LogContext::default(), events).unwrap()
    }

    #[test]
    fn test_gauge_accumulator() {
        let mut gauge = GaugeAccumulator::Single(10.0);
        assert_eq!(gauge.finalize(), 10.0);

        gauge.insert(20.0);
        assert_eq!(gauge, GaugeAccumulator::Pending(smallvec![10.0, 20.0]));

        gauge.insert(30.0);
        assert_eq!(gauge.count(), 3);
        assert_eq!(gauge.finalize(), 20.0);
    }

    #[test]
    fn test_merge_counters() {
        let events = [
            Event::new("/orders/create", time(12, 100)).with_amount(2.0),
            Event::new("/orders/create", time(12, 900)).with_amount(5.0),
        ];

        let batch = aggregate_default(&events);
        assert!(batch.gauge.is_empty());
        assert_eq!(batch.counter.len(), 1);
        assert_eq!(batch.counter[0].value, 7.0);
        assert_eq!(batch.counter[0].timestamp.as_millis(), 12_000);
    }

    #[test]
    fn test_merge_gauges() {
        let events: Vec<_> = [10.0, 20.0, 30.0]
            .into_iter()
            .map(|duration| Event::new("/orders/create", time(12, 0)).with_duration(duration))
            .collect();

        let batch = aggregate_default(&events);
        assert_eq!(batch.gauge.len(), 1);
        assert_eq!(batch.gauge[0].value, 20.0);
        assert_eq!(batch.counter.len(), 1);
        assert_eq!(batch.counter[0].value, 3.0);
    }

    #[test]
    fn test_single_gauge_untouched() {
        let events = [
            Event::new("/a/b", time(12, 0)).with_duration(0.1),
            Event::new("/a/b", time(13, 0)).with_duration(0.7),
        ];

        let batch = aggregate_default(&events);
        let values: Vec<_> = batch.gauge.iter().map(|record| record.value).collect();
        assert_eq!(values, [0.1, 0.7]);
    }

    #[test]
    fn test_different_seconds_do_not_merge() {
        let events = [
            Event::new("/orders/create", time(12, 999)),
            Event::new("/orders/create", time(13, 0)),
        ];

        let batch = aggregate_default(&events);
        let timestamps: Vec<_> = batch
            .counter
            .iter()
            .map(|record| record.timestamp.as_millis())
            .collect();
        assert_eq!(timestamps, [12_000, 13_000]);
    }

    #[test]
    fn test_dimension_values_split_records() {
        let config = FormatterConfig {
            dimensions: ["env".to_owned()].into(),
            ..Default::default()
        };

        let events = [
            Event::new("/a", time(12, 0)).with_tag("env", "prod"),
            Event::new("/a", time(12, 0)).with_tag("env", "dev"),
            Event::new("/a", time(12, 0)).with_tag("env", "prod"),
        ];

        let batch = aggregate(&config, &LogContext::default(), &events).unwrap();
        let merged: Vec<_> = batch
            .counter
            .iter()
            .map(|record| (record.dimensions["env"].as_str(), record.value))
            .collect();

        assert_eq!(merged, [("prod", 2.0), ("dev", 1.0)]);
    }

    #[test]
    fn test_dimension_order_is_irrelevant() {
        let events = [
            Event::new("/a", time(12, 0))
                .with_dimension("region", "eu")
                .with_dimension("tier", "gold"),
            Event::new("/a", time(12, 0))
                .with_dimension("tier", "gold")
                .with_dimension("region", "eu"),
        ];

        let batch = aggregate_default(&events);
        assert_eq!(batch.counter.len(), 1);
        assert_eq!(batch.counter[0].metric, "a");
        assert_eq!(batch.counter[0].value, 2.0);
    }

    #[test]
    fn test_first_seen_order() {
        let events = [
            Event::new("/b", time(12, 0)),
            Event::new("/a", time(12, 0)),
            Event::new("/b", time(12, 0)),
            Event::new("/c", time(11, 0)),
        ];

        let batch = aggregate_default(&events);
        let actions: Vec<_> = batch
            .counter
            .iter()
            .map(|record| record.dimensions["action"].as_str())
            .collect();
        assert_eq!(actions, ["b", "a", "c"]);
    }

    #[test]
    fn test_invalid_event_reports_index() {
        let events = [
            Event::new("/a", time(12, 0)),
            Event::new("/a", time(12, 0)).with_duration(-5.0),
        ];

        let error = aggregate(&FormatterConfig::default(), &LogContext::default(), &events)
            .unwrap_err();

        assert_eq!(error.index(), 1);
        assert_eq!(error.field(), "duration");
        assert_eq!(error.kind(), &ValidationErrorKind::InvalidDuration);
    }

    #[test]
    fn test_push_counts_valid_events() {
        let config = FormatterConfig::default();
        let context = LogContext::default();
        let mut aggregator = BatchAggregator::new(&config, &context);

        aggregator.push(&Event::new("/a", time(12, 0)).with_duration(3.0)).unwrap();
        let invalid = Event::new("/a", time(12, 0)).with_amount(f64::NAN);
        assert!(aggregator.push(&invalid).is_err());
        aggregator.push(&Event::new("/a", time(12, 0))).unwrap();

        assert_eq!(aggregator.event_count(), 2);
        assert_eq!(aggregator.record_count(), 2);
    }

    #[test]
    fn test_merge_preaggregated_records() {
        let config = FormatterConfig::default();
        let context = LogContext::default();
        let mut aggregator = BatchAggregator::new(&config, &context);

        let record = MetricRecord {
            metric: "queue.depth".to_owned(),
            timestamp: UnixTimestamp::from_secs(12),
            value: 4.0,
            dimensions: Dimensions::new(),
        };

        aggregator.merge(MetricCategory::Gauge, record.clone());
        aggregator.merge(MetricCategory::Gauge, MetricRecord { value: 8.0, ..record });

        let batch = aggregator.finish();
        assert_eq!(batch.gauge.len(), 1);
        assert_eq!(batch.gauge[0].value, 6.0);
    }

    #[test]
    fn test_payload_snapshot() {
        let config = FormatterConfig {
            environment: Some("production".to_owned()),
            ..Default::default()
        };
        let context = LogContext::new(Some("web-1".to_owned()), None);

        let events = [
            Event::new("/orders/create", time(12, 250)).with_duration(10.0),
            Event::new("/orders/create", time(12, 750)).with_duration(25.0),
        ];

        let batch = aggregate(&config, &context, &events).unwrap();
        insta::assert_json_snapshot!(batch, @r#"
        {
          "gauge": [
            {
              "metric": "Application.average",
              "timestamp": 12000,
              "value": 17.5,
              "dimensions": {
                "action": "create",
                "class": "orders",
                "environment": "production",
                "host": "web-1"
              }
            }
          ],
          "counter": [
            {
              "metric": "Application.counter",
              "timestamp": 12000,
              "value": 2,
              "dimensions": {
                "action": "create",
                "class": "orders",
                "environment": "production",
                "host": "web-1"
              }
            }
          ]
        }
        "#);
    }
}
