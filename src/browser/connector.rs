use std::time::Duration;

use serde_json::{json, Value};

use super::cdp::{CdpClient, CdpPage};
use super::session::SessionManager;
use crate::error::{AxbridgeError, Result};

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Holds at most one attached page and rebuilds it when the tab is gone
pub struct PageConnector {
    sessions: SessionManager,
    profile: Option<String>,
    page: Option<CdpPage>,
}

impl PageConnector {
    pub fn new(sessions: SessionManager, profile: Option<String>) -> Self {
        Self {
            sessions,
            profile,
            page: None,
        }
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// The cached page when it still answers, otherwise a fresh one
    pub async fn page(&mut self) -> Result<&CdpPage> {
        let healthy = match self.page {
            Some(ref page) => is_alive(page).await,
            None => false,
        };

        if !healthy {
            if let Some(stale) = self.page.take() {
                tracing::debug!("Cached page {} is gone, reconnecting", stale.target_id());
                stale.close().await;
            }
            let page = self.connect().await?;
            self.page = Some(page);
        }

        self.page
            .as_ref()
            .ok_or_else(|| AxbridgeError::CdpConnectionFailed("No page connection".to_string()))
    }

    async fn connect(&self) -> Result<CdpPage> {
        let ws_url = self.sessions.ensure_browser(self.profile()).await?;
        let client = CdpClient::connect(&ws_url).await?;

        let targets = client.send("Target.getTargets", json!({}), None).await?;
        let target_id = match first_page_target(&targets) {
            Some(id) => id,
            None => {
                let created = client
                    .send("Target.createTarget", json!({ "url": "about:blank" }), None)
                    .await?;
                created
                    .get("targetId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AxbridgeError::CdpConnectionFailed("createTarget returned no targetId".to_string())
                    })?
            }
        };

        CdpPage::attach(client, &target_id).await
    }

    /// Drop the cached page and close the profile's browser
    pub async fn close(&mut self) -> Result<bool> {
        if let Some(page) = self.page.take() {
            page.close().await;
        }
        self.sessions.close_session(self.profile.as_deref()).await
    }
}

async fn is_alive(page: &CdpPage) -> bool {
    if page.is_closed() {
        return false;
    }
    matches!(
        tokio::time::timeout(LIVENESS_TIMEOUT, page.evaluate("1")).await,
        Ok(Ok(_))
    )
}

fn first_page_target(targets: &Value) -> Option<String> {
    targets
        .get("targetInfos")?
        .as_array()?
        .iter()
        .find(|info| info.get("type").and_then(Value::as_str) == Some("page"))
        .and_then(|info| info.get("targetId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
