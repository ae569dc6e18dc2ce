use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mbatch_log::{Level, LogConfig};
use mbatch_metrics::{FormatterConfig, LogContext};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Name of the configuration file within the configuration folder.
const CONFIG_FILE_NAME: &str = "config.yml";

/// Indicates config related errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

#[derive(Debug, Default)]
enum ConfigErrorSource {
    #[default]
    None,
    File(PathBuf),
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// An error returned when loading or overriding the configuration.
///
/// The error names the file or the overridden field it originates from.
#[derive(Debug)]
pub struct ConfigError {
    origin: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            origin: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn file(kind: ConfigErrorKind, path: impl AsRef<Path>) -> Self {
        Self {
            origin: ConfigErrorSource::File(path.as_ref().to_path_buf()),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn field(field: &str) -> Self {
        Self {
            origin: ConfigErrorSource::FieldOverride(field.to_owned()),
            ..Self::new(ConfigErrorKind::InvalidValue)
        }
    }

    #[inline]
    fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }

    /// Returns the file this error originates from, if any.
    pub fn path(&self) -> Option<&Path> {
        match self.origin {
            ConfigErrorSource::File(ref path) => Some(path),
            _ => None,
        }
    }

    /// Returns the name of the overridden field this error originates from, if any.
    pub fn field_name(&self) -> Option<&str> {
        match self.origin {
            ConfigErrorSource::FieldOverride(ref name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.origin)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as _)
    }
}

/// Configuration values that can be loaded from a file.
trait ConfigObject: DeserializeOwned + Serialize + Default {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file within the configuration folder.
    fn path(base: &Path) -> PathBuf {
        base.join(Self::name())
    }

    /// Loads the config file from the given folder.
    ///
    /// A missing file results in the default values.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => {
                return Err(
                    ConfigError::file(ConfigErrorKind::CouldNotOpenFile, &path).with_cause(error)
                );
            }
        };

        // An empty file is not a valid YAML mapping, but should behave like a missing one.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents)
            .map_err(|error| ConfigError::file(ConfigErrorKind::BadYaml, &path).with_cause(error))
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    formatter: FormatterConfig,
    context: LogContext,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        CONFIG_FILE_NAME
    }
}

/// Command line overrides for the configuration.
///
/// Every field that is `Some` replaces the corresponding value from the configuration file.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The value of the `environment` dimension.
    pub environment: Option<String>,
    /// The name of the emitting application.
    pub application: Option<String>,
    /// The name of the emitting host.
    pub host: Option<String>,
    /// The token for the ingestion backend.
    pub api_token: Option<String>,
    /// The log level of mbatch.
    pub log_level: Option<String>,
    /// Whether the `host` dimension is added, either `true` or `false`.
    pub log_host: Option<String>,
    /// Whether the `application` dimension is added, either `true` or `false`.
    pub log_application: Option<String>,
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// Relative paths are resolved against the current working directory.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|cwd| cwd.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Creates a config from a YAML string.
    ///
    /// This is mostly useful for tests.
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_yaml::from_str(yaml).map_err(|error| {
                ConfigError::new(ConfigErrorKind::BadYaml).with_cause(error)
            })?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources, e.g. environment variables
    /// or command line parameters.
    pub fn apply_override(
        &mut self,
        mut overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(environment) = overrides.environment.take() {
            self.values.formatter.environment = Some(environment);
        }

        if let Some(api_token) = overrides.api_token.take() {
            self.values.formatter.api_token = Some(api_token);
        }

        if let Some(application) = overrides.application.take() {
            self.values.context.application = Some(application);
        }

        if let Some(host) = overrides.host.take() {
            self.values.context.host = Some(host);
        }

        if let Some(level) = overrides.log_level {
            self.values.logging.level = level
                .parse::<Level>()
                .map_err(|error| ConfigError::field("log_level").with_cause(error))?;
        }

        if let Some(log_host) = overrides.log_host {
            self.values.formatter.log_host = log_host
                .parse()
                .map_err(|error| ConfigError::field("log_host").with_cause(error))?;
        }

        if let Some(log_application) = overrides.log_application {
            self.values.formatter.log_application = log_application
                .parse()
                .map_err(|error| ConfigError::field("log_application").with_cause(error))?;
        }

        Ok(self)
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|error| ConfigError::new(ConfigErrorKind::InvalidValue).with_cause(error))
    }

    /// Returns the folder the configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the configuration of the record builder.
    pub fn formatter(&self) -> &FormatterConfig {
        &self.values.formatter
    }

    /// Returns the configured process context.
    ///
    /// If no host is configured, the command line falls back to the system's hostname.
    pub fn context(&self) -> &LogContext {
        &self.values.context
    }

    /// Returns the logging context for record building.
    ///
    /// A missing host is filled with `default_host`.
    pub fn log_context(&self, default_host: Option<String>) -> LogContext {
        let context = &self.values.context;
        LogContext::new(
            context.host.clone().or(default_host),
            context.application.clone(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mbatch_log::LogFormat;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(dir.path()).unwrap();

        assert_eq!(config.formatter(), &FormatterConfig::default());
        assert_eq!(config.context(), &LogContext::default());
        assert_eq!(config.logging().level, Level::Info);
        assert_eq!(config.path(), dir.path());
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "\n").unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.formatter(), &FormatterConfig::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            r#"
logging:
  level: debug
  format: json
formatter:
  dimensions: [region, tier]
  gauge_metric: Shop.average
  log_host: false
  environment: production
context:
  application: shop
"#,
        )
        .unwrap();

        let config = Config::from_path(dir.path()).unwrap();

        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.logging().format, LogFormat::Json);

        let formatter = config.formatter();
        assert!(formatter.allows_dimension("region"));
        assert!(formatter.allows_dimension("tier"));
        assert_eq!(formatter.gauge_metric, "Shop.average");
        assert_eq!(formatter.counter_metric, "Application.counter");
        assert!(!formatter.log_host);
        assert!(formatter.log_application);
        assert_eq!(formatter.environment(), Some("production"));

        assert_eq!(config.context().application.as_deref(), Some("shop"));
        assert_eq!(config.context().host, None);
    }

    #[test]
    fn test_bad_yaml_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "formatter: 42").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert!(matches!(error.kind(), ConfigErrorKind::BadYaml));
        assert_eq!(error.path(), Some(path.as_path()));
        assert!(error.to_string().contains("config.yml"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_yaml_str("formatter: {environment: staging}").unwrap();

        config
            .apply_override(OverridableConfig {
                environment: Some("production".to_owned()),
                application: Some("shop".to_owned()),
                api_token: Some("secret".to_owned()),
                log_level: Some("trace".to_owned()),
                log_application: Some("false".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.formatter().environment(), Some("production"));
        assert_eq!(config.formatter().api_token.as_deref(), Some("secret"));
        assert!(!config.formatter().log_application);
        assert!(config.formatter().log_host);
        assert_eq!(config.context().application.as_deref(), Some("shop"));
        assert_eq!(config.logging().level, Level::Trace);
    }

    #[test]
    fn test_invalid_override_names_field() {
        let mut config = Config::default();

        let error = config
            .apply_override(OverridableConfig {
                log_host: Some("maybe".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(error.kind(), ConfigErrorKind::InvalidValue));
        assert_eq!(error.field_name(), Some("log_host"));
        assert_eq!(error.to_string(), "invalid config value (field log_host)");
    }

    #[test]
    fn test_log_context_falls_back_to_default_host() {
        let config = Config::from_yaml_str("context: {application: shop}").unwrap();
        let context = config.log_context(Some("web-1".to_owned()));
        assert_eq!(
            context,
            LogContext::new(Some("web-1".to_owned()), Some("shop".to_owned()))
        );

        let config = Config::from_yaml_str("context: {host: db-1}").unwrap();
        let context = config.log_context(Some("web-1".to_owned()));
        assert_eq!(context.host.as_deref(), Some("db-1"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::from_yaml_str("formatter: {dimensions: [region]}").unwrap();
        let yaml = config.to_yaml_string().unwrap();

        let reloaded = Config::from_yaml_str(&yaml).unwrap();
        assert_eq!(reloaded.formatter(), config.formatter());
        assert_eq!(reloaded.context(), config.context());
    }
}
