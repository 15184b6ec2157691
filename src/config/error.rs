//! Configuration errors and the keys they refer to.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::loader::ENV_PREFIX;

/// A configuration key that can be rejected, overridden from the environment
/// or reported in an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    PortName,
    BaudRate,
    Handshake,
    Encoding,
    ReadTimeoutMs,
    WriteTimeoutMs,
    NewLine,
    ReadBufferSize,
    WriteBufferSize,
    WriteCompletion,
    PollIntervalMs,
    LoggingLevel,
    LoggingFormat,
}

impl ConfigKey {
    /// TOML table the key lives in.
    pub fn section(self) -> &'static str {
        match self {
            Self::LoggingLevel | Self::LoggingFormat => "logging",
            _ => "line",
        }
    }

    /// Key name within its section.
    pub fn name(self) -> &'static str {
        match self {
            Self::PortName => "port_name",
            Self::BaudRate => "baud_rate",
            Self::Handshake => "handshake",
            Self::Encoding => "encoding",
            Self::ReadTimeoutMs => "read_timeout_ms",
            Self::WriteTimeoutMs => "write_timeout_ms",
            Self::NewLine => "new_line",
            Self::ReadBufferSize => "read_buffer_size",
            Self::WriteBufferSize => "write_buffer_size",
            Self::WriteCompletion => "write_completion",
            Self::PollIntervalMs => "poll_interval_ms",
            Self::LoggingLevel => "level",
            Self::LoggingFormat => "format",
        }
    }

    /// Environment variable that overrides the key, `SERIAL_LINE_<SECTION>_<KEY>`.
    pub fn env_var(self) -> String {
        format!(
            "{ENV_PREFIX}_{}_{}",
            self.section().to_ascii_uppercase(),
            self.name().to_ascii_uppercase()
        )
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.name())
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found at expected path
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to write configuration file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value that parsed but cannot drive a line.
    #[error("Invalid configuration value for '{key}': {message}")]
    ValidationError { key: ConfigKey, message: String },

    /// An environment override that does not parse for its key.
    #[error("Invalid value '{value}' in {} for '{key}': {message}", .key.env_var())]
    EnvParseError {
        key: ConfigKey,
        value: String,
        message: String,
    },

    /// `save` on a loader that was built from defaults.
    #[error("No configuration file path to save to")]
    NoPath,
}

impl ConfigError {
    /// Create a validation error
    pub fn validation(key: ConfigKey, message: impl Into<String>) -> Self {
        Self::ValidationError {
            key,
            message: message.into(),
        }
    }

    /// Create an env parse error
    pub fn env_parse(key: ConfigKey, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EnvParseError {
            key,
            value: value.into(),
            message: message.into(),
        }
    }

    /// The key the error is about, if it names one.
    pub fn key(&self) -> Option<ConfigKey> {
        match self {
            Self::ValidationError { key, .. } | Self::EnvParseError { key, .. } => Some(*key),
            _ => None,
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_paths_and_env_vars() {
        assert_eq!(ConfigKey::BaudRate.to_string(), "line.baud_rate");
        assert_eq!(ConfigKey::BaudRate.env_var(), "SERIAL_LINE_LINE_BAUD_RATE");
        assert_eq!(ConfigKey::LoggingFormat.to_string(), "logging.format");
        assert_eq!(ConfigKey::LoggingFormat.env_var(), "SERIAL_LINE_LOGGING_FORMAT");
    }

    #[test]
    fn test_validation_message_names_key() {
        let err = ConfigError::validation(ConfigKey::BaudRate, "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'line.baud_rate': must be positive"
        );
        assert_eq!(err.key(), Some(ConfigKey::BaudRate));
    }

    #[test]
    fn test_env_message_names_variable() {
        let err = ConfigError::env_parse(ConfigKey::ReadTimeoutMs, "soon", "not a number");
        assert_eq!(
            err.to_string(),
            "Invalid value 'soon' in SERIAL_LINE_LINE_READ_TIMEOUT_MS for 'line.read_timeout_ms': not a number"
        );
    }

    #[test]
    fn test_parse_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("[line\n").unwrap_err();
        let err: ConfigError = toml_err.into();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert_eq!(err.key(), None);
    }
}
