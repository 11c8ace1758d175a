use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::Browser;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::cloud::CloudClient;
use super::launcher::{browser_ws_url, reap_when_exited, BrowserLauncher};
use crate::config::Config;
use crate::error::{AxbridgeError, Result};

const REMOTE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session state persisted to disk, one file per profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub profile_name: String,
    /// Local DevTools port; absent for remote and cloud browsers
    #[serde(default)]
    pub cdp_port: Option<u16>,
    #[serde(default)]
    pub pid: Option<u32>,
    pub cdp_url: String,
    #[serde(default)]
    pub cloud_session_id: Option<String>,
}

#[derive(Debug)]
pub enum SessionStatus {
    Running {
        profile: String,
        cdp_port: Option<u16>,
        cdp_url: String,
        cloud_session_id: Option<String>,
    },
    Stale {
        profile: String,
    },
    NotRunning {
        profile: String,
    },
}

/// Finds, starts and forgets browsers across process invocations
pub struct SessionManager {
    config: Config,
    sessions_dir: PathBuf,
}

impl SessionManager {
    pub fn new(config: Config) -> Self {
        let sessions_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".axbridge")
            .join("sessions");

        Self::with_sessions_dir(config, sessions_dir)
    }

    pub fn with_sessions_dir(config: Config, sessions_dir: PathBuf) -> Self {
        Self {
            config,
            sessions_dir,
        }
    }

    /// Requested profile, or the configured default. The name becomes a file
    /// name under the sessions dir, so separators and `..` are rejected.
    pub fn resolve_profile_name(&self, profile_name: Option<&str>) -> Result<String> {
        let name = match profile_name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => name.to_string(),
            None => self.config.effective_default_profile_name(),
        };
        validate_profile_name(&name)?;
        Ok(name)
    }

    fn session_file(&self, profile_name: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", profile_name))
    }

    pub fn load_session_state(&self, profile_name: &str) -> Option<SessionState> {
        let content = fs::read_to_string(self.session_file(profile_name)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn save_session_state(&self, state: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.sessions_dir)?;
        let content = serde_json::to_string_pretty(state)?;
        fs::write(self.session_file(&state.profile_name), content)?;
        Ok(())
    }

    fn remove_session_state(&self, profile_name: &str) -> Result<()> {
        let path = self.session_file(profile_name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn forget(&self, profile_name: &str) {
        if let Err(e) = self.remove_session_state(profile_name) {
            tracing::debug!("Failed to remove session state for {}: {}", profile_name, e);
        }
    }

    /// Record an externally started browser (`connect`, `--cdp`)
    pub async fn connect_external(&self, profile_name: Option<&str>, endpoint: &str) -> Result<SessionState> {
        let (cdp_port, cdp_url) = resolve_cdp_endpoint(endpoint).await?;
        let state = SessionState {
            profile_name: self.resolve_profile_name(profile_name)?,
            cdp_port,
            pid: None,
            cdp_url,
            cloud_session_id: None,
        };
        self.save_session_state(&state)?;
        Ok(state)
    }

    async fn is_session_alive(&self, state: &SessionState) -> bool {
        match state.cdp_port {
            Some(port) => browser_ws_url(port).await.is_ok(),
            None => matches!(
                tokio::time::timeout(
                    REMOTE_PROBE_TIMEOUT,
                    tokio_tungstenite::connect_async(state.cdp_url.as_str())
                )
                .await,
                Ok(Ok(_))
            ),
        }
    }

    /// Browser WebSocket URL for the profile, reusing a live browser or
    /// starting a new one.
    pub async fn ensure_browser(&self, profile_name: Option<&str>) -> Result<String> {
        let profile_name = self.resolve_profile_name(profile_name)?;

        if let Some(mut state) = self.load_session_state(&profile_name) {
            if self.is_session_alive(&state).await {
                // A browser restarted on the same port gets a new browser id
                if let Some(port) = state.cdp_port {
                    if let Ok(fresh_url) = browser_ws_url(port).await {
                        if fresh_url != state.cdp_url {
                            tracing::debug!("CDP WebSocket URL changed, updating session");
                            state.cdp_url = fresh_url;
                            self.save_session_state(&state)?;
                        }
                    }
                }
                tracing::debug!("Reusing existing session for profile: {}", profile_name);
                return Ok(state.cdp_url);
            }

            tracing::debug!("Session for profile {} is dead, removing", profile_name);
            self.forget(&profile_name);
        }

        let state = self.create_session(&profile_name).await?;
        Ok(state.cdp_url)
    }

    async fn create_session(&self, profile_name: &str) -> Result<SessionState> {
        let profile = self.config.get_profile(profile_name)?;

        let state = if let Some(ref endpoint) = profile.cdp_url {
            tracing::info!("Using remote browser for profile {}", profile_name);
            let (cdp_port, cdp_url) = resolve_cdp_endpoint(endpoint).await?;
            SessionState {
                profile_name: profile_name.to_string(),
                cdp_port,
                pid: None,
                cdp_url,
                cloud_session_id: None,
            }
        } else if self.config.cloud.enabled {
            let cloud = CloudClient::from_config(&self.config.cloud)?;
            let (session_id, cdp_url) = cloud.open().await?;
            SessionState {
                profile_name: profile_name.to_string(),
                cdp_port: None,
                pid: None,
                cdp_url,
                cloud_session_id: Some(session_id),
            }
        } else {
            let launcher = BrowserLauncher::from_profile(profile_name, &profile)?;
            tracing::info!(
                "Launching {} for profile {}",
                launcher.browser_info().browser_type.name(),
                profile_name
            );
            let (child, cdp_url) = launcher.launch_and_wait().await?;
            let pid = child.id();
            reap_when_exited(child);
            SessionState {
                profile_name: profile_name.to_string(),
                cdp_port: Some(launcher.cdp_port()),
                pid: Some(pid),
                cdp_url,
                cloud_session_id: None,
            }
        };

        self.save_session_state(&state)?;
        Ok(state)
    }

    /// Close the profile's browser (or release its cloud session) and forget
    /// it. Cleanup failures are logged, not returned.
    pub async fn close_session(&self, profile_name: Option<&str>) -> Result<bool> {
        let profile_name = self.resolve_profile_name(profile_name)?;
        let Some(state) = self.load_session_state(&profile_name) else {
            return Ok(false);
        };

        if let Some(ref session_id) = state.cloud_session_id {
            match CloudClient::from_config(&self.config.cloud) {
                Ok(cloud) => {
                    if let Err(e) = cloud.release(session_id).await {
                        tracing::debug!("Failed to release cloud session {}: {}", session_id, e);
                    }
                }
                Err(e) => tracing::debug!("Cannot release cloud session {}: {}", session_id, e),
            }
        } else {
            match Browser::connect(&state.cdp_url).await {
                Ok((mut browser, mut handler)) => {
                    tokio::spawn(async move { while handler.next().await.is_some() {} });
                    if let Err(e) = browser.close().await {
                        tracing::debug!("Browser close failed: {}", e);
                    }
                }
                Err(e) => tracing::debug!("Browser already unreachable: {}", e),
            }
        }

        self.forget(&profile_name);
        Ok(true)
    }

    pub async fn get_status(&self, profile_name: Option<&str>) -> Result<SessionStatus> {
        let profile_name = self.resolve_profile_name(profile_name)?;

        let status = match self.load_session_state(&profile_name) {
            Some(state) if self.is_session_alive(&state).await => SessionStatus::Running {
                profile: profile_name,
                cdp_port: state.cdp_port,
                cdp_url: state.cdp_url,
                cloud_session_id: state.cloud_session_id,
            },
            Some(_) => SessionStatus::Stale {
                profile: profile_name,
            },
            None => SessionStatus::NotRunning {
                profile: profile_name,
            },
        };
        Ok(status)
    }
}

fn validate_profile_name(name: &str) -> Result<()> {
    let unsafe_name = name == "."
        || name.contains("..")
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if unsafe_name {
        return Err(AxbridgeError::InvalidArguments(format!(
            "Invalid profile name '{}'. Profile names cannot contain path separators or '..'",
            name
        )));
    }
    Ok(())
}

/// Turn a port number or WebSocket URL into `(local port, browser ws url)`
pub async fn resolve_cdp_endpoint(endpoint: &str) -> Result<(Option<u16>, String)> {
    let endpoint = endpoint.trim();

    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        let url = reqwest::Url::parse(endpoint).map_err(|e| {
            AxbridgeError::InvalidArguments(format!("Invalid WebSocket URL {}: {}", endpoint, e))
        })?;
        let local = matches!(url.host_str(), Some("127.0.0.1" | "localhost"));
        let port = if local { url.port() } else { None };
        return Ok((port, endpoint.to_string()));
    }

    if let Ok(port) = endpoint.parse::<u16>() {
        let ws_url = browser_ws_url(port).await.map_err(|e| {
            AxbridgeError::CdpConnectionFailed(format!(
                "Cannot reach CDP at port {}. Is the browser running with --remote-debugging-port={}? ({})",
                port, port, e
            ))
        })?;
        return Ok((Some(port), ws_url));
    }

    Err(AxbridgeError::InvalidArguments(format!(
        "Invalid endpoint '{}'. Use a port number or a WebSocket URL (ws://...)",
        endpoint
    )))
}
