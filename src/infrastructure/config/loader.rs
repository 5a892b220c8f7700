use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".questline";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid worker pool_size: {0}. Must be at least 1")]
    InvalidPoolSize(usize),

    #[error("Invalid worker queue_capacity: {0}. Must be at least 1")]
    InvalidQueueCapacity(usize),

    #[error("Invalid reload_interval_secs: {0}. Must be at least 1")]
    InvalidReloadInterval(u64),

    #[error("Invalid cursor_flush_every: {0}. Must be at least 1")]
    InvalidCursorFlush(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Stream URL cannot be empty: {0}")]
    EmptyStreamUrl(&'static str),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .questline/config.yaml (created by init)
    /// 3. .questline/local.yaml (optional overrides)
    /// 4. `QUESTLINE_*` environment variables, `__` separating nested keys
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment variables still win.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("QUESTLINE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// `--config` when given, the project hierarchy otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Config> {
        path.map_or_else(Self::load, Self::load_from_file)
    }

    fn figment() -> Figment {
        let dir = Path::new(CONFIG_DIR);
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("QUESTLINE_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        if !["daily", "hourly", "never"].contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.workers.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize(0));
        }
        if config.workers.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(0));
        }
        if config.quests.reload_interval_secs == 0 {
            return Err(ConfigError::InvalidReloadInterval(0));
        }

        let streams = &config.streams;
        if streams.cursor_flush_every == 0 {
            return Err(ConfigError::InvalidCursorFlush(0));
        }
        if streams.reconnect.initial_backoff_ms >= streams.reconnect.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                streams.reconnect.initial_backoff_ms,
                streams.reconnect.max_backoff_ms,
            ));
        }
        if !(0.0..1.0).contains(&streams.reconnect.jitter) {
            return Err(ConfigError::ValidationFailed(format!(
                "reconnect jitter {} must be in [0, 1)",
                streams.reconnect.jitter
            )));
        }
        if streams.firehose_url.trim().is_empty() {
            return Err(ConfigError::EmptyStreamUrl("firehose_url"));
        }
        if streams.jetstream_url.trim().is_empty() {
            return Err(ConfigError::EmptyStreamUrl("jetstream_url"));
        }

        if config.network.requests_per_second == 0 {
            return Err(ConfigError::ValidationFailed(
                "network requests_per_second must be at least 1".to_string(),
            ));
        }
        if config.network.handle.is_some() != config.network.app_password.is_some() {
            return Err(ConfigError::ValidationFailed(
                "network handle and app_password must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".questline/questline.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.workers.pool_size, 3);
        assert_eq!(config.quests.reload_interval_secs, 300);
        assert_eq!(config.streams.cursor_flush_every, 100);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /var/lib/questline.db
  max_connections: 4
logging:
  level: debug
  format: json
streams:
  extra_collections: [app.quest.scroll]
  reconnect:
    initial_backoff_ms: 1000
    max_backoff_ms: 60000
workers:
  pool_size: 8
partner:
  api_base: https://partner.example
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/var/lib/questline.db");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.streams.extra_collections, vec!["app.quest.scroll"]);
        assert_eq!(config.streams.reconnect.max_backoff_ms, 60_000);
        assert!((config.streams.reconnect.jitter - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.workers.pool_size, 8);
        assert_eq!(config.workers.queue_capacity, 512);
        assert_eq!(config.partner.api_base.as_deref(), Some("https://partner.example"));

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_zero_workers_and_queue() {
        let mut config = Config::default();
        config.workers.pool_size = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPoolSize(0))
        ));

        let mut config = Config::default();
        config.workers.queue_capacity = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidQueueCapacity(0))
        ));
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = Config::default();
        config.quests.reload_interval_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidReloadInterval(0))
        ));

        let mut config = Config::default();
        config.streams.cursor_flush_every = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidCursorFlush(0))
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.streams.reconnect.initial_backoff_ms = 30_000;
        config.streams.reconnect.max_backoff_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(30_000, 10_000))
        ));
    }

    #[test]
    fn test_validate_empty_stream_url() {
        let mut config = Config::default();
        config.streams.jetstream_url = " ".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyStreamUrl("jetstream_url"))
        ));
    }

    #[test]
    fn test_validate_half_configured_credentials() {
        let mut config = Config::default();
        config.network.handle = Some("quests.bsky.social".to_string());
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: warn\nworkers:\n  pool_size: 5").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.workers.pool_size, 5);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "workers:\n  pool_size: 0").unwrap();
        file.flush().unwrap();

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
        assert!(ConfigLoader::load_from_file("/nonexistent/questline.yaml").is_err());
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "logging:\n  level: info\n  format: json\nworkers:\n  pool_size: 2").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "logging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
        assert_eq!(config.logging.format, "json", "Base value should persist");
        assert_eq!(config.workers.pool_size, 2);
    }

    #[test]
    fn test_env_override_with_nesting() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("QUESTLINE_WORKERS__POOL_SIZE", "7");
            jail.set_env("QUESTLINE_LOGGING__LEVEL", "trace");
            let config: Config = Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Env::prefixed("QUESTLINE_").split("__"))
                .extract()?;
            assert_eq!(config.workers.pool_size, 7);
            assert_eq!(config.logging.level, "trace");
            Ok(())
        });
    }
}
