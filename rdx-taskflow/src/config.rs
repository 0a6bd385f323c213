//! Defines the configuration structures for the Taskflow runtime.
//!
//! These structs are deserialized with `serde`, either directly or through
//! [`RuntimeConfig::load`], which layers an optional TOML file and
//! `TASKFLOW_`-prefixed environment variables.

use crate::error::ConfigError;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Prefix of the environment variables read by [`RuntimeConfig::load`].
pub const ENV_PREFIX: &str = "TASKFLOW";

/// The top-level configuration for a `Runtime`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How to reach the worker agent.
    pub client: ClientConfig,

    /// The timezone wait directives are evaluated in. Uses the IANA names
    /// (e.g. "Europe/Paris"). Defaults to the process' local timezone.
    pub timezone: Option<Tz>,
}

/// Connection settings for the worker agent.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_worker_url")]
    pub worker_url: String,

    #[serde(default = "default_worker_port")]
    pub worker_port: u16,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub app_id: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default)]
    pub app_env: Option<String>,
}

impl RuntimeConfig {
    /// Loads the configuration from an optional TOML file, then from the
    /// environment.
    ///
    /// Environment variables take precedence over the file. Nested keys use a
    /// double underscore, e.g. `TASKFLOW_CLIENT__WORKER_PORT=4002`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }
}

impl ClientConfig {
    /// Returns `true` when every credential needed to talk to the worker is set.
    pub fn has_credentials(&self) -> bool {
        [&self.app_id, &self.api_token, &self.app_env]
            .iter()
            .all(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

// --- Default value functions for serde ---

fn default_worker_url() -> String {
    "http://localhost".to_string()
}

fn default_worker_port() -> u16 {
    4001
}

fn default_api_version() -> String {
    "v_newton".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            worker_url: default_worker_url(),
            worker_port: default_worker_port(),
            api_version: default_api_version(),
            app_id: None,
            api_token: None,
            app_env: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_point_at_local_worker() {
        let config = RuntimeConfig::default();
        assert_eq!(config.client.worker_url, "http://localhost");
        assert_eq!(config.client.worker_port, 4001);
        assert_eq!(config.client.api_version, "v_newton");
        assert!(config.timezone.is_none());
        assert!(!config.client.has_credentials());
    }

    #[test]
    fn loads_partial_toml_file() {
        let path = std::env::temp_dir()
            .join(format!("taskflow-config-{}.toml", std::process::id()));
        fs::write(
            &path,
            r#"
timezone = "Europe/Paris"

[client]
worker_port = 4555
app_id = "app"
api_token = "token"
app_env = "staging"
"#,
        )
        .unwrap();

        let loaded = RuntimeConfig::load(Some(&path));
        fs::remove_file(&path).ok();
        let config = loaded.unwrap();

        assert_eq!(config.timezone, Some(chrono_tz::Europe::Paris));
        assert_eq!(config.client.worker_port, 4555);
        assert_eq!(config.client.worker_url, "http://localhost");
        assert!(config.client.has_credentials());
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("taskflow-config-does-not-exist.toml");
        assert!(RuntimeConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn blank_credentials_do_not_count() {
        let config = ClientConfig {
            app_id: Some("app".into()),
            api_token: Some(String::new()),
            app_env: Some("prod".into()),
            ..ClientConfig::default()
        };
        assert!(!config.has_credentials());
    }
}
