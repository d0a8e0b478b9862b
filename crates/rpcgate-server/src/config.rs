//! Server configuration management

use std::path::{Path, PathBuf};

use rpcgate_transport_traits::LimitsConfig;
use rpcgate_wire::AnyCodec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rpcinfo::DEFAULT_POOL_CAPACITY;

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "RPCGATE";

/// Server configuration
///
/// Every field has a default, so a configuration file only needs the values
/// it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service name reported as the callee of every call
    pub service_name: String,
    /// Idle call states kept for reuse
    pub pool_capacity: usize,
    /// Payload codec name (`json`, or `msgpack` with that feature)
    pub codec: String,
    /// Write an `INTERNAL` status when an endpoint panics
    pub send_status_on_fault: bool,
    /// Message size limits
    pub limits: LimitsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: "rpcgate".to_string(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            codec: "json".to_string(),
            send_status_on_fault: false,
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where log output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Standard error only
    #[default]
    Stderr,
    /// Rolling files only
    FileOnly,
    /// Standard error and rolling files
    Both,
    /// Logging disabled
    None,
}

/// Log file rotation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    /// New file every minute
    Minute,
    /// New file every hour
    Hourly,
    /// New file every day
    Daily,
    /// Single file
    #[default]
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub structured: bool,
    /// Output target
    pub output: LogOutput,
    /// Directory for log files
    pub directory: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
    /// Log file rotation
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
            output: LogOutput::Stderr,
            directory: None,
            file_prefix: "rpcgate".to_string(),
            rotation: LogRotation::Never,
        }
    }
}

impl LoggingConfig {
    /// Errors only, to stderr
    #[must_use]
    pub fn stderr_minimal() -> Self {
        Self {
            level: "error".to_string(),
            ..Self::default()
        }
    }

    /// Everything down to debug, to stderr
    #[must_use]
    pub fn stderr_debug() -> Self {
        Self {
            level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Structured logs to hourly files in `directory` and to stderr
    #[must_use]
    pub fn production(directory: impl Into<PathBuf>) -> Self {
        Self {
            structured: true,
            output: LogOutput::Both,
            directory: Some(directory.into()),
            rotation: LogRotation::Hourly,
            ..Self::default()
        }
    }

    /// Logs to files in `directory` only
    #[must_use]
    pub fn file_only(directory: impl Into<PathBuf>) -> Self {
        Self {
            output: LogOutput::FileOnly,
            directory: Some(directory.into()),
            ..Self::default()
        }
    }
}

impl ServerConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format is picked from the extension. Environment variables with the
    /// `RPCGATE_` prefix override file settings; nested keys use `__`, e.g.
    /// `RPCGATE_LOGGING__LEVEL=debug`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`ServerConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(environment(env_prefix))
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Load configuration from defaults and `RPCGATE_` environment variables only
    ///
    /// # Errors
    ///
    /// Returns an error if an environment value cannot be parsed or validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(environment(ENV_PREFIX))
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// The configured payload codec
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown codec name.
    pub fn payload_codec(&self) -> Result<AnyCodec, ConfigError> {
        AnyCodec::from_name(&self.codec).ok_or_else(|| ConfigError::InvalidValue {
            field: "codec",
            reason: format!(
                "unknown codec {:?}, expected one of {:?}",
                self.codec,
                AnyCodec::available_names()
            ),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.payload_codec()?;
        if self.limits.max_recv_message_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_recv_message_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn environment(prefix: &str) -> config::Environment {
    config::Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
