mod profile;

pub use profile::ProfileConfig;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{AxbridgeError, Result};
use crate::refs::FallbackPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Browser configuration
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Cloud browser-session provider
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Snapshot and action behavior
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Named profiles
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// Default profile name
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    /// Default headless mode
    #[serde(default)]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            default_profile: default_profile_name(),
            headless: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Use the cloud provider instead of a local browser
    #[serde(default)]
    pub enabled: bool,

    /// API key forwarded to the provider
    pub api_key: Option<String>,

    /// Provider project the sessions are billed to
    pub project_id: Option<String>,

    /// Provider base URL
    #[serde(default = "default_cloud_url")]
    pub base_url: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_cloud_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            project_id: None,
            base_url: default_cloud_url(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_cloud_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Elide unnamed structural wrappers by default
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Per-action wait for the target element (ms)
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,

    /// Wait for `document.readyState == "complete"` after navigation (ms)
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// What to do when a ref's disambiguation index is out of range
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            compact: true,
            action_timeout_ms: default_action_timeout_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            fallback: FallbackPolicy::default(),
        }
    }
}

fn default_profile_name() -> String {
    "axbridge".to_string()
}

fn default_cloud_url() -> String {
    "https://api.browserbase.com".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_cloud_timeout_ms() -> u64 {
    60_000
}

fn default_action_timeout_ms() -> u64 {
    5000
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn normalize_default_profile_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        default_profile_name()
    } else {
        trimmed.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(default_profile_name(), ProfileConfig::default());

        Self {
            browser: BrowserConfig::default(),
            cloud: CloudConfig::default(),
            snapshot: SnapshotConfig::default(),
            profiles,
        }
    }
}

impl Config {
    pub fn effective_default_profile_name(&self) -> String {
        normalize_default_profile_name(&self.browser.default_profile)
    }

    /// Load configuration from all sources (file, env, defaults)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration layered over an explicit config file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // AXBRIDGE_SNAPSHOT__ACTION_TIMEOUT_MS -> snapshot.action_timeout_ms.
            // Flat names (AXBRIDGE_CLOUD, AXBRIDGE_PROFILE) belong to the CLI.
            .merge(
                Env::prefixed("AXBRIDGE_")
                    .split("__")
                    .filter(|key| key.as_str().contains('.')),
            )
            .extract()
            .map_err(|e| AxbridgeError::ConfigError(e.to_string()))
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("axbridge")
            .join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AxbridgeError::ConfigError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get a profile by name, falling back to default
    pub fn get_profile(&self, name: &str) -> Result<ProfileConfig> {
        let normalized_name = name.trim();

        if let Some(profile) = self.profiles.get(normalized_name) {
            return Ok(profile.clone());
        }

        // The configured default profile always exists implicitly.
        if normalized_name == self.effective_default_profile_name() {
            let mut profile = ProfileConfig::default();

            if let Some(ref exe) = self.browser.executable {
                profile.browser_path = Some(exe.clone());
            }
            profile.headless = self.browser.headless;

            return Ok(profile);
        }

        Err(AxbridgeError::ConfigError(format!(
            "Profile not found: {}",
            normalized_name
        )))
    }

    /// Look up a dotted key for `config get`
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value = match key {
            "browser.executable" => self.browser.executable.clone(),
            "browser.default_profile" => Some(self.browser.default_profile.clone()),
            "browser.headless" => Some(self.browser.headless.to_string()),
            "cloud.enabled" => Some(self.cloud.enabled.to_string()),
            "cloud.api_key" => self.cloud.api_key.clone(),
            "cloud.project_id" => self.cloud.project_id.clone(),
            "cloud.base_url" => Some(self.cloud.base_url.clone()),
            "cloud.poll_interval_ms" => Some(self.cloud.poll_interval_ms.to_string()),
            "cloud.timeout_ms" => Some(self.cloud.timeout_ms.to_string()),
            "snapshot.compact" => Some(self.snapshot.compact.to_string()),
            "snapshot.action_timeout_ms" => Some(self.snapshot.action_timeout_ms.to_string()),
            "snapshot.navigation_timeout_ms" => {
                Some(self.snapshot.navigation_timeout_ms.to_string())
            }
            "snapshot.fallback" => Some(self.snapshot.fallback.as_str().to_string()),
            _ => {
                return Err(AxbridgeError::ConfigError(format!(
                    "Unknown config key: {}",
                    key
                )))
            }
        };
        Ok(value)
    }

    /// Set a dotted key for `config set`
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "browser.executable" => self.browser.executable = Some(value.to_string()),
            "browser.default_profile" => self.browser.default_profile = value.to_string(),
            "browser.headless" => self.browser.headless = parse_bool(key, value)?,
            "cloud.enabled" => self.cloud.enabled = parse_bool(key, value)?,
            "cloud.api_key" => self.cloud.api_key = Some(value.to_string()),
            "cloud.project_id" => self.cloud.project_id = Some(value.to_string()),
            "cloud.base_url" => self.cloud.base_url = value.to_string(),
            "cloud.poll_interval_ms" => self.cloud.poll_interval_ms = parse_u64(key, value)?,
            "cloud.timeout_ms" => self.cloud.timeout_ms = parse_u64(key, value)?,
            "snapshot.compact" => self.snapshot.compact = parse_bool(key, value)?,
            "snapshot.action_timeout_ms" => {
                self.snapshot.action_timeout_ms = parse_u64(key, value)?
            }
            "snapshot.navigation_timeout_ms" => {
                self.snapshot.navigation_timeout_ms = parse_u64(key, value)?
            }
            "snapshot.fallback" => self.snapshot.fallback = value.parse()?,
            _ => {
                return Err(AxbridgeError::ConfigError(format!(
                    "Unknown config key: {}",
                    key
                )))
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| AxbridgeError::ConfigError(format!("{} must be true or false", key)))
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| AxbridgeError::ConfigError(format!("{} must be a number", key)))
}
