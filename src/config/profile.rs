use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-profile local browser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Remote debugging port the browser is launched with
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    /// User data directory (defaults to the axbridge data dir)
    pub user_data_dir: Option<String>,

    /// Browser executable path (profile-specific override)
    pub browser_path: Option<String>,

    #[serde(default)]
    pub headless: bool,

    /// Browser WebSocket URL of an already running browser
    pub cdp_url: Option<String>,

    /// Extra browser arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_cdp_port() -> u16 {
    9222
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            cdp_port: default_cdp_port(),
            user_data_dir: None,
            browser_path: None,
            headless: false,
            cdp_url: None,
            extra_args: Vec::new(),
        }
    }
}

impl ProfileConfig {
    /// Whether this profile points at a browser we do not launch ourselves
    pub fn is_remote(&self) -> bool {
        self.cdp_url.is_some()
    }

    /// Resolve the user data directory for `profile_name`, expanding `~`
    pub fn resolved_user_data_dir(&self, profile_name: &str) -> PathBuf {
        match self.user_data_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("axbridge")
                .join("profiles")
                .join(profile_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_profile_is_detected() {
        let profile = ProfileConfig {
            cdp_url: Some("ws://127.0.0.1:9222/devtools/browser/abc".to_string()),
            ..Default::default()
        };
        assert!(profile.is_remote());
        assert!(!ProfileConfig::default().is_remote());
    }

    #[test]
    fn default_user_data_dir_is_namespaced_by_profile() {
        let dir = ProfileConfig::default().resolved_user_data_dir("work");
        assert!(dir.ends_with("axbridge/profiles/work"));
    }

    #[test]
    fn explicit_user_data_dir_wins() {
        let profile = ProfileConfig {
            user_data_dir: Some("/tmp/axbridge-profile".to_string()),
            ..Default::default()
        };
        assert_eq!(
            profile.resolved_user_data_dir("ignored"),
            PathBuf::from("/tmp/axbridge-profile")
        );
    }
}
