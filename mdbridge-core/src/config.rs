// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates capacities and timeouts and provides defaults for optional sections
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub avatars: AvatarConfig,
    #[serde(default)]
    pub receipts: ReceiptConfig,
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account identifier the paired device must belong to (phone number or JID)
    #[serde(default)]
    pub username: String,
    /// Name announced with our presence; empty disables the announcement
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Import historical conversations on initial sync (large, privacy-sensitive)
    #[serde(default)]
    pub fetch_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of recent inbound messages kept for quotes and reactions
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_avatar_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-request timeout for the picture download
    #[serde(default = "default_avatar_timeout_secs")]
    pub timeout_secs: u64,
}

impl AvatarConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_avatar_queue_capacity(),
            timeout_secs: default_avatar_timeout_secs(),
        }
    }
}

/// When read receipts for inbound messages are sent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptPolicy {
    /// Held until the host marks the conversation as read
    #[default]
    Deferred,
    /// Sent as soon as the message is displayed
    Immediate,
    Never,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiptConfig {
    #[serde(default)]
    pub policy: ReceiptPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    /// Upper bound on fetching and saving one inbound attachment
    #[serde(default = "default_attachment_timeout_secs")]
    pub timeout_secs: u64,
}

impl AttachmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            timeout_secs: default_attachment_timeout_secs(),
        }
    }
}

fn default_cache_capacity() -> usize {
    100
}

fn default_avatar_queue_capacity() -> usize {
    64
}

fn default_avatar_timeout_secs() -> u64 {
    10
}

fn default_attachment_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_download_dir() -> String {
    paths::attachments_dir().to_string_lossy().to_string()
}

/// Interpret common truthy/falsy strings from environment variables
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. MDBRIDGE_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/mdbridge/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("MDBRIDGE_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration with environment variable overrides and validate it
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without applying overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("MDBRIDGE_USERNAME") {
            self.account.username = username;
        }
        if let Ok(name) = std::env::var("MDBRIDGE_DISPLAY_NAME") {
            self.account.display_name = name;
        }
        if let Ok(value) = std::env::var("MDBRIDGE_FETCH_HISTORY") {
            match parse_bool(&value) {
                Some(flag) => self.history.fetch_history = flag,
                None => tracing::warn!(
                    value = %value,
                    "Ignoring unparseable MDBRIDGE_FETCH_HISTORY"
                ),
            }
        }
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            anyhow::bail!("cache.capacity must be at least 1");
        }
        if self.avatars.queue_capacity == 0 {
            anyhow::bail!("avatars.queue_capacity must be at least 1");
        }
        if !(1..=60).contains(&self.avatars.timeout_secs) {
            anyhow::bail!(
                "avatars.timeout_secs must be between 1 and 60, got {}",
                self.avatars.timeout_secs
            );
        }
        if !(1..=300).contains(&self.attachments.timeout_secs) {
            anyhow::bail!(
                "attachments.timeout_secs must be between 1 and 300, got {}",
                self.attachments.timeout_secs
            );
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.history.fetch_history);
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.avatars.queue_capacity, 64);
        assert_eq!(config.avatars.timeout(), Duration::from_secs(10));
        assert_eq!(config.attachments.timeout(), Duration::from_secs(30));
        assert_eq!(config.receipts.policy, ReceiptPolicy::Deferred);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
[account]
username = "4915112345678"

[receipts]
policy = "never"
"#,
        )
        .unwrap();
        assert_eq!(config.account.username, "4915112345678");
        assert_eq!(config.receipts.policy, ReceiptPolicy::Never);
        assert_eq!(config.cache.capacity, 100);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.avatars.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_timeout() {
        let mut config = Config::default();
        config.avatars.timeout_secs = 0;
        assert!(config.validate().is_err());
        config.avatars.timeout_secs = 600;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.attachments.timeout_secs = 0;
        assert!(config.validate().is_err());
        config.attachments.timeout_secs = 301;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_to_toml_round_trips_policy() {
        let mut config = Config::default();
        config.receipts.policy = ReceiptPolicy::Immediate;
        let text = config.to_toml().unwrap();
        assert!(text.contains("policy = \"immediate\""));
    }
}
