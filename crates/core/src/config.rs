//! Configuration management
//!
//! This module handles loading, saving, and migrating the s3kv configuration
//! file. The file is TOML, stored at `<config dir>/s3kv/config.toml` unless
//! `S3KV_CONFIG_DIR` points elsewhere.
//!
//! Changes to `schema_version` require migration support.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::profile::Profile;

/// Current configuration schema version
///
/// Bumping this version requires a migration step in [`ConfigManager::load`]
/// and a matching test.
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "S3KV_CONFIG_DIR";

const DEFAULT_OUTPUT: &str = "human";
const DEFAULT_COLOR: &str = "auto";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Record cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Configured store profiles
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Default settings for CLI behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output format: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never"
    #[serde(default = "default_color")]
    pub color: String,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,

    /// Transfers in flight for multi-object operations
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Profile used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    1
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            progress: true,
            concurrency: default_concurrency(),
            profile: None,
        }
    }
}

/// Read-through cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Only keys matching this regex are cached
    #[serde(default = "default_key_pattern")]
    pub key_pattern: String,

    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Entry lifetime; 0 disables expiry
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_key_pattern() -> String {
    ".+".to_string()
}

fn default_max_items() -> usize {
    1000
}

fn default_max_age_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_pattern: default_key_pattern(),
            max_items: default_max_items(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            cache: CacheConfig::default(),
            profiles: Vec::new(),
        }
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager at the default location
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("s3kv"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// A missing file yields the default configuration. Older schema
    /// versions are migrated; newer ones are rejected.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| Error::local_fs(&self.config_path, e))?;
        let config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            return self.migrate(config);
        }
        if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade s3kv.",
                config.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if needed. On Unix the file is made
    /// readable by the owner only, since profiles hold credentials.
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::local_fs(parent, e))?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::local_fs(&self.config_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }

    fn migrate(&self, mut config: Config) -> Result<Config> {
        tracing::debug!(from = config.schema_version, to = SCHEMA_VERSION, "migrating configuration");
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn temp_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("config.toml"));
        (manager, temp_dir)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.defaults.output, "human");
        assert_eq!(config.defaults.concurrency, 1);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.key_pattern, ".+");
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let (manager, _temp_dir) = temp_config_manager();
        let config = manager.load().unwrap();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_save_and_load() {
        let (manager, _temp_dir) = temp_config_manager();

        let mut config = Config::default();
        config.defaults.concurrency = 8;
        config.cache.enabled = true;
        let mut profile = Profile::new("minio");
        profile.endpoint = Some("http://localhost:9000".into());
        profile.bucket = Some("records".into());
        config.profiles.push(profile);

        manager.save(&config).unwrap();
        let loaded = manager.load().unwrap();

        assert_eq!(loaded.defaults.concurrency, 8);
        assert!(loaded.cache.enabled);
        assert_eq!(loaded.profiles.len(), 1);
        assert_eq!(loaded.profiles[0].bucket.as_deref(), Some("records"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (manager, _temp_dir) = temp_config_manager();
        manager.save(&Config::default()).unwrap();
        let mode = std::fs::metadata(manager.config_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(
            manager.config_path(),
            "schema_version = 1\n[cache]\nenabled = true\n",
        )
        .unwrap();
        let config = manager.load().unwrap();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_items, 1000);
        assert_eq!(config.cache.max_age_secs, 300);
    }

    #[test]
    fn test_old_schema_is_migrated() {
        let (manager, _temp_dir) = temp_config_manager();
        std::fs::write(manager.config_path(), "schema_version = 0\n").unwrap();
        assert_eq!(manager.load().unwrap().schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_schema_version_too_new() {
        let (manager, _temp_dir) = temp_config_manager();
        let content = format!("schema_version = {}\n", SCHEMA_VERSION + 1);
        std::fs::write(manager.config_path(), content).unwrap();

        let err = manager.load().unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }
}
