use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::sleep;

use super::discovery::{discover_browser, BrowserInfo, BrowserType};
use crate::config::ProfileConfig;
use crate::error::{AxbridgeError, Result};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);
const READY_POLL_ATTEMPTS: u32 = 20;

/// Starts a local browser with remote debugging enabled
pub struct BrowserLauncher {
    browser_info: BrowserInfo,
    cdp_port: u16,
    headless: bool,
    user_data_dir: PathBuf,
    extra_args: Vec<String>,
    ready_attempts: u32,
}

impl BrowserLauncher {
    /// Launcher for `profile_name`, using the profile's browser override or
    /// the first browser found on this machine.
    pub fn from_profile(profile_name: &str, profile: &ProfileConfig) -> Result<Self> {
        let browser_info = match profile.browser_path {
            Some(ref path) => {
                let path = PathBuf::from(shellexpand::tilde(path).to_string());
                if !path.exists() {
                    return Err(AxbridgeError::BrowserLaunchFailed(format!(
                        "Browser not found at: {}",
                        path.display()
                    )));
                }
                // Any Chromium derivative speaks the same flags
                BrowserInfo::new(BrowserType::Chrome, path)
            }
            None => discover_browser()?,
        };

        Ok(Self {
            browser_info,
            cdp_port: profile.cdp_port,
            headless: profile.headless,
            user_data_dir: profile.resolved_user_data_dir(profile_name),
            extra_args: profile.extra_args.clone(),
            ready_attempts: READY_POLL_ATTEMPTS,
        })
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.cdp_port),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Spawn the browser process
    pub fn launch(&self) -> Result<Child> {
        std::fs::create_dir_all(&self.user_data_dir)?;

        let args = self.build_args();
        tracing::debug!(
            "Launching browser: {:?} with args: {:?}",
            self.browser_info.path,
            args
        );

        Command::new(&self.browser_info.path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                AxbridgeError::BrowserLaunchFailed(format!(
                    "Failed to launch {}: {}",
                    self.browser_info.browser_type.name(),
                    e
                ))
            })
    }

    /// Spawn the browser and wait until its DevTools endpoint answers.
    /// Returns the process handle and the browser WebSocket URL. A browser
    /// that never answers is killed and reaped before the error is returned.
    pub async fn launch_and_wait(&self) -> Result<(Child, String)> {
        let mut child = self.launch()?;

        for attempt in 1..=self.ready_attempts {
            sleep(READY_POLL_INTERVAL).await;

            match browser_ws_url(self.cdp_port).await {
                Ok(ws_url) => {
                    tracing::info!("CDP ready at: {}", ws_url);
                    return Ok((child, ws_url));
                }
                Err(e) => tracing::debug!("CDP not ready yet (attempt {}): {}", attempt, e),
            }
        }

        if let Err(e) = child.kill() {
            tracing::debug!("Failed to kill unresponsive browser {}: {}", child.id(), e);
        }
        if let Err(e) = child.wait() {
            tracing::debug!("Failed to reap browser {}: {}", child.id(), e);
        }

        Err(AxbridgeError::CdpConnectionFailed(format!(
            "Timeout waiting for CDP on port {}",
            self.cdp_port
        )))
    }

    pub fn browser_info(&self) -> &BrowserInfo {
        &self.browser_info
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }
}

/// Wait on a launched browser from a detached thread so its exit status is
/// collected while a long-running server keeps going.
pub fn reap_when_exited(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || match child.wait() {
            Ok(status) => tracing::debug!("Browser {} exited: {}", pid, status),
            Err(e) => tracing::debug!("Failed to wait for browser {}: {}", pid, e),
        });
    if let Err(e) = spawned {
        tracing::debug!("Cannot watch browser {}: {}", pid, e);
    }
}

/// HTTP client for the DevTools endpoint; never goes through a proxy.
pub(crate) fn local_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Ask `127.0.0.1:<port>/json/version` for the browser WebSocket URL.
pub async fn browser_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/version", port);

    let response = local_http_client()
        .get(&url)
        .send()
        .await
        .map_err(|e| AxbridgeError::CdpConnectionFailed(format!("Failed to connect to CDP: {}", e)))?;

    if !response.status().is_success() {
        return Err(AxbridgeError::BrowserNotRunning);
    }

    let json: serde_json::Value = response.json().await.map_err(|e| {
        AxbridgeError::CdpConnectionFailed(format!("Failed to parse CDP response: {}", e))
    })?;

    json.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AxbridgeError::CdpConnectionFailed("No WebSocket URL in CDP response".to_string())
        })
}
