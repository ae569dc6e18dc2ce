use crate::aggregator::BatchAggregator;
use crate::batch::Batch;
use crate::builder::{LogContext, RecordBuilder};
use crate::config::FormatterConfig;
use crate::event::{Event, ValidationError};

/// Formats events into payloads for the ingestion backend.
///
/// The formatter owns its configuration and the logging context, both of which are read-only
/// after construction. It can be shared across threads, and concurrent calls do not interfere.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use mbatch_metrics::{Event, Formatter, FormatterConfig, LogContext};
///
/// let formatter = Formatter::new(FormatterConfig::default(), LogContext::default());
/// let time = Utc.timestamp_opt(12, 0).unwrap();
///
/// let events = [
///     Event::new("/orders/create", time).with_amount(2.0),
///     Event::new("/orders/create", time).with_amount(5.0),
/// ];
///
/// let batch = formatter.format_batch(&events).unwrap();
/// assert_eq!(batch.counter.len(), 1);
/// assert_eq!(batch.counter[0].value, 7.0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Formatter {
    config: FormatterConfig,
    context: LogContext,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(config: FormatterConfig, context: LogContext) -> Self {
        Self { config, context }
    }

    /// Returns the configuration of this formatter.
    pub fn config(&self) -> &FormatterConfig {
        &self.config
    }

    /// Returns the logging context of this formatter.
    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// Returns the token for the ingestion backend, if configured.
    pub fn api_token(&self) -> Option<&str> {
        self.config.api_token.as_deref()
    }

    /// Returns a [`RecordBuilder`] for this formatter's configuration.
    pub fn builder(&self) -> RecordBuilder<'_> {
        RecordBuilder::new(&self.config)
    }

    /// Formats a single event without merging.
    ///
    /// The payload contains the event's record under its category and, for timed events, the
    /// derived counter.
    pub fn format_event(&self, event: &Event) -> Result<Batch, ValidationError> {
        let built = self
            .builder()
            .build(event, &self.context)
            .map_err(|kind| ValidationError::new(0, kind))?;

        let mut batch = Batch::new();
        for (category, record) in built.into_records() {
            batch.push(category, record);
        }

        Ok(batch)
    }

    /// Aggregates a sequence of events into a single payload.
    ///
    /// See [`BatchAggregator`] for the merge rules.
    pub fn format_batch<'e, I>(&self, events: I) -> Result<Batch, ValidationError>
    where
        I: IntoIterator<Item = &'e Event>,
    {
        let mut aggregator = self.aggregator();
        aggregator.extend(events)?;
        Ok(aggregator.finish())
    }

    /// Returns an empty aggregator for incremental batching.
    pub fn aggregator(&self) -> BatchAggregator<'_> {
        BatchAggregator::new(&self.config, &self.context)
    }
}
