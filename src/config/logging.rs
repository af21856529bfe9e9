//! Logging configuration and subscriber setup.

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
///
/// `RUST_LOG` takes precedence over `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".into()
}

impl LoggingConfig {
    /// Install the global tracing subscriber.
    ///
    /// Installing twice is a no-op; the first subscriber wins.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let installed = match self.format {
            LogFormat::Json => fmt()
                .json()
                .with_env_filter(filter)
                .with_target(false)
                .try_init(),
            LogFormat::Pretty => fmt().with_env_filter(filter).with_target(false).try_init(),
        };

        if installed.is_err() {
            tracing::debug!("Tracing subscriber already installed");
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_format() {
        let cfg: LoggingConfig = toml::from_str("level = \"debug\"\nformat = \"json\"").unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: LoggingConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LogFormat::Pretty);
    }
}
