//! Turns single events into metric records.

use mbatch_common::time::UnixTimestamp;
use serde::{Deserialize, Serialize};

use crate::config::FormatterConfig;
use crate::event::{Event, ValidationErrorKind};
use crate::record::{BuiltRecords, Dimensions, MetricCategory, MetricRecord};

/// Class name used when the metric path has no parent segments.
const UNKNOWN_CLASS: &str = "Unknown";

/// Information about the emitting process, supplied by the caller's logging context.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogContext {
    /// Name of the host emitting the events.
    pub host: Option<String>,
    /// Name of the application emitting the events.
    pub application: Option<String>,
}

impl LogContext {
    /// Creates a context with the given host and application.
    pub fn new(host: Option<String>, application: Option<String>) -> Self {
        Self { host, application }
    }

    fn host(&self) -> Option<&str> {
        self.host.as_deref().filter(|host| !host.is_empty())
    }

    fn application(&self) -> Option<&str> {
        self.application.as_deref().filter(|app| !app.is_empty())
    }
}

/// Builds [`MetricRecord`]s from [`Event`]s.
///
/// The builder only borrows the configuration. Every call to [`build`](Self::build) allocates its
/// own records, so a builder can be shared freely across threads.
#[derive(Clone, Copy, Debug)]
pub struct RecordBuilder<'a> {
    config: &'a FormatterConfig,
}

impl<'a> RecordBuilder<'a> {
    /// Creates a new builder for the given configuration.
    pub fn new(config: &'a FormatterConfig) -> Self {
        Self { config }
    }

    /// Builds the metric record of an event and, for timed events, its derived counter.
    ///
    /// Events with a `duration` become gauges, all others counters. The value is the event's
    /// `amount`, falling back to its `duration` and finally to `1`.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use mbatch_metrics::{Event, FormatterConfig, LogContext, MetricCategory, RecordBuilder};
    ///
    /// let config = FormatterConfig::default();
    /// let time = Utc.timestamp_opt(12, 999_000_000).unwrap();
    /// let event = Event::new("/orders/create", time).with_duration(25.0);
    ///
    /// let built = RecordBuilder::new(&config)
    ///     .build(&event, &LogContext::default())
    ///     .unwrap();
    ///
    /// assert_eq!(built.category, MetricCategory::Gauge);
    /// assert_eq!(built.metric.metric, "Application.average");
    /// assert_eq!(built.metric.timestamp.as_millis(), 12_000);
    /// assert_eq!(built.metric.value, 25.0);
    /// assert_eq!(built.derived_counter.unwrap().value, 1.0);
    /// ```
    pub fn build(
        &self,
        event: &Event,
        context: &LogContext,
    ) -> Result<BuiltRecords, ValidationErrorKind> {
        event.validate()?;

        let timestamp = UnixTimestamp::from_datetime(event.time);

        let (metric, mut dimensions) = match &event.explicit_dimensions {
            Some(explicit) => {
                let dimensions = explicit
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_string()))
                    .filter(|(_, value)| !value.is_empty())
                    .collect();

                (explicit_metric_name(&event.metric_path), dimensions)
            }
            None => {
                let metric = match event.duration {
                    Some(_) => self.config.gauge_metric.clone(),
                    None => self.config.counter_metric.clone(),
                };

                (metric, self.tag_dimensions(event))
            }
        };

        self.add_context_dimensions(&mut dimensions, context);

        let record = MetricRecord {
            metric,
            timestamp,
            value: event.amount.or(event.duration).unwrap_or(1.0),
            dimensions,
        };

        if event.duration.is_none() {
            return Ok(BuiltRecords {
                metric: record,
                derived_counter: None,
                category: MetricCategory::Counter,
            });
        }

        let derived_counter = if event.explicit_dimensions.is_some() {
            None
        } else {
            Some(MetricRecord {
                metric: self.config.counter_metric.clone(),
                value: event.amount.unwrap_or(1.0),
                ..record.clone()
            })
        };

        Ok(BuiltRecords {
            metric: record,
            derived_counter,
            category: MetricCategory::Gauge,
        })
    }

    /// Computes `class` and `action` from the metric path and adds allowed named tags.
    fn tag_dimensions(&self, event: &Event) -> Dimensions {
        let (class, action) = class_and_action(&event.metric_path);

        let mut dimensions = Dimensions::new();
        dimensions.insert("class".to_owned(), class);
        dimensions.insert("action".to_owned(), action.to_owned());

        for (name, value) in &event.named_tags {
            if !self.config.allows_dimension(name) {
                continue;
            }

            let value = value.to_string();
            if !value.is_empty() {
                dimensions.insert(name.clone(), value);
            }
        }

        dimensions
    }

    fn add_context_dimensions(&self, dimensions: &mut Dimensions, context: &LogContext) {
        if self.config.log_host {
            if let Some(host) = context.host() {
                dimensions.insert("host".to_owned(), host.to_owned());
            }
        }

        if self.config.log_application {
            if let Some(application) = context.application() {
                dimensions.insert("application".to_owned(), application.to_owned());
            }
        }

        if let Some(environment) = self.config.environment() {
            dimensions.insert("environment".to_owned(), environment.to_owned());
        }
    }
}

/// Derives the metric name of an event with explicit dimensions, e.g. `/a/b/c` becomes `a.b.c`.
fn explicit_metric_name(path: &str) -> String {
    path.trim_start_matches('/').replace('/', ".")
}

/// Splits a metric path into its `class` and `action` dimensions.
///
/// The last segment is the action, all preceding segments joined with `::` are the class. Trailing
/// empty segments are ignored. Paths with a single segment belong to the `Unknown` class, and
/// paths without any segment use the raw path as action.
fn class_and_action(path: &str) -> (String, &str) {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    let segments: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    };

    match segments.split_last() {
        Some((action, class)) if !class.is_empty() => (class.join("::"), *action),
        Some((action, _)) => (UNKNOWN_CLASS.to_owned(), *action),
        None => (UNKNOWN_CLASS.to_owned(), path),
    }
}
