use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::SchedulerSettings;
use crate::store::Guard;

/// Configuration file structure for the webhook receiver.
///
/// Configuration files are loaded from the current directory or a specified
/// path. Command-line flags override whatever the file sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Listen address for the HTTP server
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Seconds in-flight requests get to finish after shutdown is requested
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebhookConfig {
    /// Shared secret configured on the GitHub webhook
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// SQLite database file
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds an event waits in the intake table before it is applied
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Maximum events applied per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FanoutConfig {
    /// Capacity of the shared broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Relay queue size for each connected observer
    #[serde(default = "default_observer_capacity")]
    pub observer_capacity: usize,

    /// Seconds between keep-alive comments on the event stream
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconcileConfig {
    /// Reject events that would move an entity backwards in its lifecycle
    #[serde(default = "default_reject_regressions")]
    pub reject_regressions: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_age_secs: default_max_age_secs(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            observer_capacity: default_observer_capacity(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            reject_regressions: default_reject_regressions(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_age_secs() -> u64 {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_observer_capacity() -> usize {
    64
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reject_regressions() -> bool {
    true
}

impl StorageConfig {
    /// Database file to open: the configured path, or `cilens/hooks.db` under
    /// the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database {
            return path.clone();
        }

        dirs::data_dir()
            .map(|dir| dir.join("cilens").join("hooks.db"))
            .unwrap_or_else(|| PathBuf::from("cilens-hooks.db"))
    }
}

impl SchedulerConfig {
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            max_age: Duration::from_secs(self.max_age_secs),
            batch_size: self.batch_size.max(1),
        }
    }
}

impl ReconcileConfig {
    pub fn guard(&self) -> Guard {
        if self.reject_regressions {
            Guard::TerminalAndRegression
        } else {
            Guard::TerminalOnly
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./cilens-hooks.toml
    /// 3. ./cilens-hooks.json
    /// 4. ./cilens-hooks.yaml
    /// 5. ./cilens-hooks.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "cilens-hooks.toml",
            "cilens-hooks.json",
            "cilens-hooks.yaml",
            "cilens-hooks.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

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
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.server.shutdown_grace_secs, 10);
        assert!(config.webhook.secret.is_none());
        assert_eq!(config.fanout.channel_capacity, 1024);
        assert_eq!(config.fanout.observer_capacity, 64);
        assert_eq!(config.reconcile.guard(), Guard::TerminalAndRegression);

        let settings = config.scheduler.settings();
        assert_eq!(settings.interval, Duration::from_secs(5));
        assert_eq!(settings.max_age, Duration::from_secs(10));
        assert_eq!(settings.batch_size, 100);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[server]
bind = "127.0.0.1:9000"

[webhook]
secret = "s3cret"

[storage]
database = "/tmp/hooks.db"

[scheduler]
max-age-secs = 30
batch-size = 10

[reconcile]
reject-regressions = false
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.shutdown_grace_secs, 10);
        assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.storage.database_path(), PathBuf::from("/tmp/hooks.db"));
        assert_eq!(config.scheduler.settings().max_age, Duration::from_secs(30));
        assert_eq!(config.scheduler.settings().batch_size, 10);
        assert_eq!(config.scheduler.interval_secs, 5);
        assert_eq!(config.reconcile.guard(), Guard::TerminalOnly);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = r#"
fanout:
  observer-capacity: 8
  keep-alive-secs: 5
"#;
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.fanout.observer_capacity, 8);
        assert_eq!(config.fanout.keep_alive_secs, 5);
        assert_eq!(config.fanout.channel_capacity, 1024);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("definitely-missing-hooks.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = SchedulerConfig {
            interval_secs: 0,
            max_age_secs: 0,
            batch_size: 0,
        };
        let settings = config.settings();
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert_eq!(settings.max_age, Duration::ZERO);
        assert_eq!(settings.batch_size, 1);
    }

    #[test]
    fn test_save_and_reload_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cilens-hooks.json");

        let mut config = Config::default();
        config.webhook.secret = Some("abc".to_string());
        config.server.bind = "127.0.0.1:1234".to_string();
        config.save(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("shutdown-grace-secs"));

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.webhook.secret.as_deref(), Some("abc"));
        assert_eq!(reloaded.server.bind, "127.0.0.1:1234");
    }
}
