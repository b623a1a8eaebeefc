//! CLI configuration file.
//!
//! ```toml
//! [client]
//! default_operation_timeout_ms = 30000
//! client_friendly_name = "ops-shell"
//!
//! [observability]
//! log_format = "json"
//! otlp_endpoint = "http://localhost:4317"
//! ```
//!
//! Every section and field is optional. Command-line flags override file
//! values.

use std::path::Path;

use anyhow::Context;
use client::ClientSettings;
use serde::Deserialize;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// OTLP gRPC collector. Tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub client: ClientSettings,
    pub observability: ObservabilityConfig,
}

impl CliConfig {
    /// Parses a TOML document.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("settings file is not valid TOML")?;
        config.client.validate()?;
        Ok(config)
    }

    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read settings file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid settings file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        assert_eq!(CliConfig::parse("").unwrap(), CliConfig::default());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = CliConfig::parse(
            r#"
            [client]
            default_operation_timeout_ms = 1500
            client_friendly_name = "ops"

            [observability]
            log_format = "json"
            otlp_endpoint = "http://collector:4317"
            "#,
        )
        .unwrap();
        assert_eq!(config.client.default_operation_timeout_ms, 1500);
        assert_eq!(config.client.client_friendly_name, "ops");
        assert_eq!(
            config.client.health_operation_timeout_ms,
            ClientSettings::default().health_operation_timeout_ms
        );
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(
            config.observability.otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }

    #[test]
    fn test_out_of_range_settings_are_rejected() {
        let err = CliConfig::parse("[client]\nhealth_operation_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("health_operation_timeout_ms"));
    }
}
