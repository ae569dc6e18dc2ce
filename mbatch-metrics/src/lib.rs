//! Metric record building and batch aggregation.
//!
//! This crate turns structured log events into the payload of a metrics ingestion backend. The
//! backend stores one data point per second, metric name and set of dimensions, so events that
//! collide on these are merged before the payload is serialized.
//!
//! # Records
//!
//! The [`RecordBuilder`] turns a single [`Event`] into a [`MetricRecord`]:
//!
//!  - Events with a `duration` are **gauges**. Unless they carry explicit dimensions, each gauge
//!    is accompanied by a derived **counter**, so that timed measurements remain countable.
//!  - All other events are **counters**.
//!  - Timestamps are floored to the full second and serialized in milliseconds.
//!  - Without explicit dimensions, the metric path `/orders/create` becomes the dimensions
//!    `class: orders` and `action: create`, and the record gets a configured metric name. With
//!    explicit dimensions, the path itself becomes the metric name `orders.create`.
//!
//! # Aggregation
//!
//! The [`BatchAggregator`] merges records with equal timestamp, metric name and dimensions:
//! counters are summed, and gauges are averaged. Output order follows the first occurrence of each
//! merge key.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use mbatch_metrics::{Event, Formatter};
//!
//! let formatter = Formatter::default();
//! let time = Utc.timestamp_opt(12, 999_000_000).unwrap();
//!
//! let events: Vec<_> = [10.0, 20.0, 30.0]
//!     .into_iter()
//!     .map(|duration| Event::new("/orders/create", time).with_duration(duration))
//!     .collect();
//!
//! let batch = formatter.format_batch(&events).unwrap();
//! assert_eq!(
//!     batch.to_json().unwrap(),
//!     concat!(
//!         r#"{"gauge":[{"metric":"Application.average","timestamp":12000,"value":20,"#,
//!         r#""dimensions":{"action":"create","class":"orders"}}],"#,
//!         r#""counter":[{"metric":"Application.counter","timestamp":12000,"value":3,"#,
//!         r#""dimensions":{"action":"create","class":"orders"}}]}"#,
//!     )
//! );
//! ```

#![warn(missing_docs)]

mod aggregator;
mod batch;
mod builder;
mod config;
mod event;
mod formatter;
mod record;

pub use aggregator::*;
pub use batch::*;
pub use builder::*;
pub use config::*;
pub use event::*;
pub use formatter::*;
pub use record::*;
