use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Default metric name of gauge records derived from timed events.
pub const DEFAULT_GAUGE_METRIC: &str = "Application.average";

/// Default metric name of counter records.
pub const DEFAULT_COUNTER_METRIC: &str = "Application.counter";

/// Parameters used by the [`RecordBuilder`](crate::RecordBuilder).
///
/// The configuration is constructed once and read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Opaque token for the ingestion backend.
    ///
    /// Not used for formatting. It is carried along so that the delivery layer can authenticate
    /// the payloads produced here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Names of the named tags that become dimensions.
    ///
    /// Defaults to an empty list. Only applies to events without explicit dimensions.
    pub dimensions: BTreeSet<String>,

    /// Metric name of gauge records.
    ///
    /// Defaults to `"Application.average"`.
    pub gauge_metric: String,

    /// Metric name of counter records, including counters derived from gauges.
    ///
    /// Defaults to `"Application.counter"`.
    pub counter_metric: String,

    /// Adds the `host` dimension if the host is known.
    ///
    /// Defaults to `true`.
    pub log_host: bool,

    /// Adds the `application` dimension if the application is known.
    ///
    /// Defaults to `true`.
    pub log_application: bool,

    /// Value of the `environment` dimension.
    ///
    /// Defaults to `None`, which disables the dimension. An empty string also disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl FormatterConfig {
    /// Returns the environment, if one is configured.
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref().filter(|env| !env.is_empty())
    }

    /// Returns `true` if named tags with this name are turned into dimensions.
    pub fn allows_dimension(&self, name: &str) -> bool {
        self.dimensions.contains(name)
    }
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            dimensions: BTreeSet::new(),
            gauge_metric: DEFAULT_GAUGE_METRIC.to_owned(),
            counter_metric: DEFAULT_COUNTER_METRIC.to_owned(),
            log_host: true,
            log_application: true,
            environment: None,
        }
    }
}
