//! Application settings.
//!
//! Layered from a config file and `SYNCDECK_*` environment variables, e.g.
//! `SYNCDECK_QUEUE__BASE_URL=https://api.example.com`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use syncdeck_queue::{DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_FILE, DEFAULT_RECONNECT_DELAY, DEFAULT_SYNC_INTERVAL};
use syncdeck_types::SourceConfig;

/// Config file read when `--config` is not given. Optional.
pub const DEFAULT_CONFIG_FILE: &str = "syncdeck.toml";

pub const ENV_PREFIX: &str = "SYNCDECK";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub sources: Vec<SourceConfig>,
    pub queue: QueueSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sources: Vec::new(),
            queue: QueueSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub storage_path: PathBuf,
    pub base_url: String,
    /// Item type to endpoint path.
    pub endpoints: HashMap<String, String>,
    pub token: Option<String>,
    pub max_retries: u32,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub sync_interval: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub reconnect_delay: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub request_timeout: Duration,
    pub start_online: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_QUEUE_FILE),
            base_url: String::new(),
            endpoints: HashMap::new(),
            token: None,
            max_retries: DEFAULT_MAX_RETRIES,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            request_timeout: Duration::from_secs(10),
            start_online: true,
        }
    }
}

impl Settings {
    /// Load settings from `path` (required) or from [`DEFAULT_CONFIG_FILE`]
    /// if it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__");
        Self::load_with_env(path, env)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use syncdeck_types::{Backoff, SourceKind};

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(Some(HashMap::new()))
    }

    #[test]
    fn defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            Settings::load_with_env(Some(&dir.path().join("missing.toml")), no_env());
        assert!(settings.is_err(), "an explicit path must exist");

        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.queue.max_retries, 3);
        assert_eq!(settings.queue.sync_interval, Duration::from_secs(30));
        assert!(settings.queue.start_online);
    }

    #[test]
    fn parses_sources_and_queue_from_toml() {
        let file = write_config(
            r#"
log_level = "debug"

[[sources]]
id = "kpis"
type = "rest"
endpoint = "https://api.example.com/kpis"
cache = { enabled = true, ttl_secs = 60 }
retry = { attempts = 3, delay_ms = 100, backoff = "exponential" }
polling = { enabled = true, interval_ms = 30000 }

[[sources]]
id = "targets"
type = "static"
body = { mrr = 10000 }

[queue]
base_url = "https://api.example.com"
sync_interval = "2m"
reconnect_delay = "500ms"
max_retries = 5

[queue.endpoints]
kpi_update = "/api/kpis"
"#,
        );

        let settings = Settings::load_with_env(Some(file.path()), no_env()).unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.sources.len(), 2);

        let kpis = &settings.sources[0];
        assert_eq!(kpis.kind, SourceKind::Rest);
        assert!(kpis.cache.enabled);
        assert_eq!(kpis.retry.as_ref().unwrap().backoff, Backoff::Exponential);
        assert_eq!(kpis.polling.interval(), Some(Duration::from_secs(30)));
        assert_eq!(settings.sources[1].kind, SourceKind::Static);

        assert_eq!(settings.queue.sync_interval, Duration::from_secs(120));
        assert_eq!(settings.queue.reconnect_delay, Duration::from_millis(500));
        assert_eq!(settings.queue.max_retries, 5);
        assert_eq!(
            settings.queue.endpoints.get("kpi_update").map(String::as_str),
            Some("/api/kpis")
        );
    }

    #[test]
    fn environment_overrides_file() {
        let file = write_config("[queue]\nbase_url = \"http://file\"\n");
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(Some(HashMap::from([
                ("SYNCDECK_QUEUE__BASE_URL".to_string(), "http://env".to_string()),
                ("SYNCDECK_LOG_LEVEL".to_string(), "warn".to_string()),
            ])));

        let settings = Settings::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(settings.queue.base_url, "http://env");
        assert_eq!(settings.log_level, "warn");
    }
}
