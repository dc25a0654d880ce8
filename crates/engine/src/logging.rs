//! # Logging setup
//!
//! Builds the `tracing` subscriber for one invocation. The subscriber is
//! installed as the thread default and removed when the returned guard drops,
//! so nothing global outlives the command.

use std::io;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, EnvFilter};

/// Logging configuration for a single invocation
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Environment filter (supports directives like "pg_migrate_engine=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Set the level filter
    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    /// Switch to JSON output
    pub fn json(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directives: `RUST_LOG` first, then the explicit filter, then the level.
    /// sqlx statement logging is capped at `warn` unless a directive says otherwise.
    pub fn build_filter(&self) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let directives = match &self.env_filter {
            Some(filter) => filter.clone(),
            None => format!("{},sqlx=warn", self.level),
        };
        EnvFilter::try_new(directives)
    }
}

/// Install logging for the current invocation.
///
/// Logs go to stderr so that `status` and `version` output on stdout stays
/// machine-readable.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<DefaultGuard, tracing_subscriber::filter::ParseError> {
    let filter = config.build_filter()?;

    let guard = if config.json_format {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json());
        tracing::subscriber::set_default(subscriber)
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false));
        tracing::subscriber::set_default(subscriber)
    };

    tracing::debug!(
        level = %config.level,
        format = if config.json_format { "json" } else { "text" },
        "Logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_builders() {
        let config = LoggingConfig::default()
            .with_level("debug")
            .json(true)
            .with_env_filter("pg_migrate_engine=trace");

        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert_eq!(config.env_filter.as_deref(), Some("pg_migrate_engine=trace"));
    }

    #[test]
    fn test_guard_scopes_subscriber() {
        let guard = init_logging(&LoggingConfig::default()).unwrap();
        tracing::info!("inside invocation");
        drop(guard);
    }
}
