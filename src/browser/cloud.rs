use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::config::CloudConfig;
use crate::error::{AxbridgeError, Result};

/// A remote browser session as reported by the provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSession {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub connect_url: Option<String>,
}

impl CloudSession {
    /// Browser WebSocket URL once the session is usable
    pub fn ready_url(&self) -> Option<&str> {
        if !self.status.eq_ignore_ascii_case("running") {
            return None;
        }
        self.connect_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(alias = "error")]
    message: String,
}

/// Client for the cloud browser-session provider
pub struct CloudClient {
    client: Client,
    base_url: String,
    api_key: String,
    project_id: Option<String>,
    poll_interval: Duration,
    timeout: Duration,
}

impl CloudClient {
    pub fn from_config(config: &CloudConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AxbridgeError::ConfigError(
                    "Cloud browser needs an API key (--api-key or cloud.api_key)".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AxbridgeError::CloudError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            project_id: config.project_id.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-BB-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
    }

    pub async fn create_session(&self) -> Result<CloudSession> {
        let body = CreateSessionRequest {
            project_id: self.project_id.as_deref(),
        };

        let response = self
            .request(Method::POST, "/v1/sessions")
            .json(&body)
            .send()
            .await
            .map_err(|e| AxbridgeError::CloudError(format!("Request failed: {}", e)))?;

        handle_response(response).await
    }

    pub async fn get_session(&self, id: &str) -> Result<CloudSession> {
        let response = self
            .request(Method::GET, &format!("/v1/sessions/{}", id))
            .send()
            .await
            .map_err(|e| AxbridgeError::CloudError(format!("Request failed: {}", e)))?;

        handle_response(response).await
    }

    /// Poll until the session is running and return its connect URL
    pub async fn wait_until_running(&self, session: CloudSession) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let mut session = session;

        loop {
            if let Some(url) = session.ready_url() {
                tracing::info!("Cloud session {} is running", session.id);
                return Ok(url.to_string());
            }

            if Instant::now() >= deadline {
                return Err(AxbridgeError::Timeout(format!(
                    "Cloud session {} not running after {}ms (last status: {})",
                    session.id,
                    self.timeout.as_millis(),
                    session.status
                )));
            }

            tracing::debug!("Cloud session {} status: {}", session.id, session.status);
            sleep(self.poll_interval).await;
            session = self.get_session(&session.id).await?;
        }
    }

    /// Create a session and wait for it. Returns `(session_id, connect_url)`.
    pub async fn open(&self) -> Result<(String, String)> {
        let session = self.create_session().await?;
        let id = session.id.clone();
        tracing::info!("Requested cloud browser session {}", id);

        let url = self.wait_until_running(session).await?;
        Ok((id, url))
    }

    pub async fn release(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/v1/sessions/{}", id))
            .send()
            .await
            .map_err(|e| AxbridgeError::CloudError(format!("Request failed: {}", e)))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(AxbridgeError::CloudError(format!(
                "Failed to release session {}: {}",
                id,
                response.status()
            )))
        }
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| AxbridgeError::CloudError(format!("Failed to parse response: {}", e)));
    }

    let message = match status {
        StatusCode::NOT_FOUND => "Session not found".to_string(),
        StatusCode::TOO_MANY_REQUESTS => "Rate limited. Please try again later.".to_string(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "Invalid or missing API key".to_string(),
        _ => match response.json::<ProviderError>().await {
            Ok(err) => err.message,
            Err(_) => format!("Provider error: {}", status),
        },
    };
    Err(AxbridgeError::CloudError(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn session(status: &str, connect_url: Option<&str>) -> CloudSession {
        CloudSession {
            id: "sess-1".to_string(),
            status: status.to_string(),
            connect_url: connect_url.map(str::to_string),
        }
    }

    /// Serve `body` with `status` to every request on a local port.
    async fn canned_server(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{}", addr)
    }

    fn client_for(base_url: String, timeout_ms: u64) -> CloudClient {
        CloudClient::from_config(&CloudConfig {
            enabled: true,
            api_key: Some("test-key".to_string()),
            base_url,
            poll_interval_ms: 10,
            timeout_ms,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let result = CloudClient::from_config(&CloudConfig::default());
        assert!(matches!(result, Err(AxbridgeError::ConfigError(_))));
    }

    #[test]
    fn session_is_ready_only_when_running_with_url() {
        assert_eq!(
            session("RUNNING", Some("wss://connect.example/abc")).ready_url(),
            Some("wss://connect.example/abc")
        );
        assert_eq!(session("PENDING", Some("wss://x")).ready_url(), None);
        assert_eq!(session("running", None).ready_url(), None);
        assert_eq!(session("running", Some("")).ready_url(), None);
    }

    #[test]
    fn parses_provider_payload() {
        let json = r#"{"id":"abc","status":"RUNNING","connectUrl":"wss://c/abc","projectId":"p"}"#;
        let session: CloudSession = serde_json::from_str(json).unwrap();

        assert_eq!(session.id, "abc");
        assert_eq!(session.ready_url(), Some("wss://c/abc"));
    }

    #[tokio::test]
    async fn open_returns_connect_url_of_running_session() {
        let base = canned_server(
            "201 Created",
            r#"{"id":"s1","status":"RUNNING","connectUrl":"wss://cloud/s1"}"#,
        )
        .await;

        let (id, url) = client_for(base, 1000).open().await.unwrap();
        assert_eq!(id, "s1");
        assert_eq!(url, "wss://cloud/s1");
    }

    #[tokio::test]
    async fn session_that_never_runs_times_out() {
        let base = canned_server("200 OK", r#"{"id":"s2","status":"PENDING"}"#).await;

        let err = client_for(base, 50).open().await.unwrap_err();
        assert!(matches!(err, AxbridgeError::Timeout(_)));
    }

    #[tokio::test]
    async fn unauthorized_is_reported_as_cloud_error() {
        let base = canned_server("401 Unauthorized", r#"{"message":"bad key"}"#).await;

        let err = client_for(base, 50).create_session().await.unwrap_err();
        assert!(matches!(err, AxbridgeError::CloudError(msg) if msg.contains("API key")));
    }
}
