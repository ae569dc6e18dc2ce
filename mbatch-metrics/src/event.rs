//! The input side: events as they are handed over by the logging framework.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead};

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A scalar value of an explicit dimension or a named tag.
///
/// Scalars are stringified when they become dimension values: strings are used verbatim,
/// booleans become `true` or `false`, numbers use their shortest representation and `null` becomes
/// the empty string. Arrays and objects are not scalars and are rejected during deserialization.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// An explicit `null`.
    #[default]
    Null,
    /// A boolean flag.
    Bool(bool),
    /// An integer or floating point number.
    Number(serde_json::Number),
    /// A string.
    String(String),
}

impl Scalar {
    /// Returns `true` if the stringified value is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => b.fmt(f),
            Self::Number(n) => n.fmt(f),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for Scalar {
    /// Non-finite floats have no JSON representation and convert to [`Scalar::Null`].
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScalarVisitor;

        impl Visitor<'_> for ScalarVisitor {
            type Value = Scalar;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string, number, boolean or null")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Scalar, E> {
                Ok(Scalar::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Scalar, E> {
                Ok(Scalar::Null)
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<Scalar, E> {
                Ok(Scalar::Bool(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Scalar, E> {
                Ok(Scalar::Number(value.into()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Scalar, E> {
                Ok(Scalar::Number(value.into()))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Scalar, E> {
                serde_json::Number::from_f64(value)
                    .map(Scalar::Number)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Float(value), &self))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Scalar, E> {
                Ok(Scalar::String(value.to_owned()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<Scalar, E> {
                Ok(Scalar::String(value))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// A structured log event carrying a measurement.
///
/// Events are created by the caller and consumed once by the [`RecordBuilder`]. On the wire, field
/// names are camel cased and `time` is either an RFC 3339 string or fractional unix seconds:
///
/// ```json
/// {"metricPath": "/orders/create", "duration": 12.5, "time": 1700000000.25}
/// ```
///
/// [`RecordBuilder`]: crate::RecordBuilder
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Slash-delimited identifier of the measured operation, for example `/orders/create`.
    pub metric_path: String,

    /// Duration of a timed measurement in milliseconds.
    ///
    /// The presence of a duration turns the event into a gauge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Explicit value of the measurement, taking precedence over `duration`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    /// Fully resolved dimensions.
    ///
    /// If present, the metric name is derived directly from the metric path and `named_tags` are
    /// ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_dimensions: Option<BTreeMap<String, Scalar>>,

    /// Ambient tags attached by the caller, filtered through the dimension allow-list.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub named_tags: BTreeMap<String, Scalar>,

    /// Time at which the event occurred.
    #[serde(with = "mbatch_common::time::flexible")]
    pub time: DateTime<Utc>,
}

impl Event {
    /// Creates a counter event without value, dimensions or tags.
    pub fn new(metric_path: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            metric_path: metric_path.into(),
            duration: None,
            amount: None,
            explicit_dimensions: None,
            named_tags: BTreeMap::new(),
            time,
        }
    }

    /// Sets the duration of a timed measurement.
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the explicit value of the measurement.
    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Adds an explicit dimension, switching the event to explicit naming.
    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.explicit_dimensions
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Adds a named tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.named_tags.insert(key.into(), value.into());
        self
    }

    /// Parses an event from its JSON representation.
    ///
    /// The `index` identifies the event in its batch and is reported in the error together with
    /// the path of the offending field.
    ///
    /// # Example
    ///
    /// ```
    /// use mbatch_metrics::Event;
    ///
    /// let event = Event::from_json(r#"{"metricPath": "/orders/create", "time": 12.5}"#, 0).unwrap();
    /// assert_eq!(event.metric_path, "/orders/create");
    ///
    /// let error = Event::from_json(r#"{"metricPath": "/a", "duration": "slow", "time": 1}"#, 3);
    /// assert_eq!(error.unwrap_err().field(), "duration");
    /// ```
    pub fn from_json(json: &str, index: usize) -> Result<Self, ValidationError> {
        let mut deserializer = serde_json::Deserializer::from_str(json);
        let event: Self = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|error| ValidationError::from_path_error(index, error))?;

        deserializer
            .end()
            .map_err(|error| ValidationError::malformed(index, ".", &error))?;

        Ok(event)
    }

    /// Parses an event from an already decoded JSON value.
    pub fn from_value(value: serde_json::Value, index: usize) -> Result<Self, ValidationError> {
        serde_path_to_error::deserialize(value)
            .map_err(|error| ValidationError::from_path_error(index, error))
    }

    /// Checks the numeric fields of this event.
    ///
    /// Durations must be finite and non-negative and amounts must be finite. Any time is valid,
    /// including times before the UNIX epoch.
    pub fn validate(&self) -> Result<(), ValidationErrorKind> {
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(ValidationErrorKind::InvalidDuration);
            }
        }

        if let Some(amount) = self.amount {
            if !amount.is_finite() {
                return Err(ValidationErrorKind::InvalidAmount);
            }
        }

        Ok(())
    }
}

/// The reason an event was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The duration is negative or not a finite number.
    #[error("expected a finite, non-negative number")]
    InvalidDuration,
    /// The amount is not a finite number.
    #[error("expected a finite number")]
    InvalidAmount,
    /// The event could not be decoded from its wire representation.
    #[error("{message}")]
    Malformed {
        /// Path of the offending field, or `.` for the event itself.
        path: String,
        /// Description of the decoding failure.
        message: String,
    },
}

impl ValidationErrorKind {
    /// Returns the name or path of the offending field.
    pub fn field(&self) -> &str {
        match self {
            Self::InvalidDuration => "duration",
            Self::InvalidAmount => "amount",
            Self::Malformed { path, .. } => path,
        }
    }
}

/// An event in a batch failed validation.
///
/// Invalid input is never coerced, since a silently replaced value would corrupt the merge keys of
/// the whole batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid field `{}` in event {index}: {kind}", .kind.field())]
pub struct ValidationError {
    index: usize,
    kind: ValidationErrorKind,
}

impl ValidationError {
    /// Creates a new validation error for the event at the given index.
    pub fn new(index: usize, kind: ValidationErrorKind) -> Self {
        Self { index, kind }
    }

    fn malformed(index: usize, path: &str, error: &serde_json::Error) -> Self {
        Self::new(
            index,
            ValidationErrorKind::Malformed {
                path: path.to_owned(),
                message: error.to_string(),
            },
        )
    }

    fn from_path_error(index: usize, error: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = error.path().to_string();
        Self::malformed(index, &path, error.inner())
    }

    /// Returns the position of the offending event in its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the name or path of the offending field.
    pub fn field(&self) -> &str {
        self.kind.field()
    }

    /// Returns the reason the event was rejected.
    pub fn kind(&self) -> &ValidationErrorKind {
        &self.kind
    }
}

/// An error returned by [`parse_events`].
#[derive(Debug, Error)]
pub enum ParseEventsError {
    /// Reading from the input failed.
    #[error("failed to read events")]
    Io(#[from] io::Error),
    /// A line did not contain a valid event.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Reads newline-delimited JSON events.
///
/// Blank lines are skipped and do not count towards the event index, so indices in errors match
/// the positions in the returned list.
pub fn parse_events<R: BufRead>(reader: R) -> Result<Vec<Event>, ParseEventsError> {
    let mut events = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        events.push(Event::from_json(&line, events.len())?);
    }

    Ok(events)
}
