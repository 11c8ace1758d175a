use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use rmcp::model::*;
use rmcp::service::{RequestContext, RoleServer};
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use tokio::sync::Mutex;

use super::tools::{self, *};
use crate::browser::{normalize_url, PageConnector, SessionManager};
use crate::config::Config;
use crate::error::{AxbridgeError, Result};
use crate::refs::{ActionRunner, SnapshotSession};

/// What a successful tool call hands back
#[derive(Debug)]
pub enum ToolOutput {
    Text(String),
    Image { png: Vec<u8>, caption: String },
}

struct ServerState {
    connector: PageConnector,
    snapshot: SnapshotSession,
}

/// MCP server exposing the browser tools. Tool calls run one at a time.
#[derive(Clone)]
pub struct BrowserServer {
    state: Arc<Mutex<ServerState>>,
    runner: ActionRunner,
    navigation_timeout: Duration,
    default_compact: bool,
}

impl BrowserServer {
    pub fn new(config: Config, profile: Option<String>) -> Self {
        let runner = ActionRunner::new(
            config.snapshot.fallback,
            Duration::from_millis(config.snapshot.action_timeout_ms),
        );
        let navigation_timeout = Duration::from_millis(config.snapshot.navigation_timeout_ms);
        let default_compact = config.snapshot.compact;

        Self::with_connector(
            PageConnector::new(SessionManager::new(config), profile),
            runner,
            navigation_timeout,
            default_compact,
        )
    }

    pub fn with_connector(
        connector: PageConnector,
        runner: ActionRunner,
        navigation_timeout: Duration,
        default_compact: bool,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                connector,
                snapshot: SnapshotSession::default(),
            })),
            runner,
            navigation_timeout,
            default_compact,
        }
    }

    /// Serve MCP over stdin/stdout until the client disconnects
    pub async fn serve_stdio(self) -> Result<()> {
        let service = self
            .serve(stdio())
            .await
            .map_err(|e| AxbridgeError::Other(format!("Failed to start MCP server: {}", e)))?;

        tracing::info!("MCP server ready on stdio");
        service
            .waiting()
            .await
            .map_err(|e| AxbridgeError::Other(format!("MCP server stopped: {}", e)))?;
        Ok(())
    }

    /// Run one tool by name
    pub async fn dispatch(&self, name: &str, arguments: Option<&JsonObject>) -> Result<ToolOutput> {
        let mut state = self.state.lock().await;

        match name {
            tools::NAVIGATE => {
                let args: NavigateArgs = parse_args(arguments)?;
                let url = normalize_url(&args.url)?;
                let page = state.connector.page().await?;
                page.navigate(&url, self.navigation_timeout).await?;
                let title = page.title().await.unwrap_or_default();
                Ok(ToolOutput::Text(format!("Navigated to {}\nTitle: {}", url, title)))
            }
            tools::BACK => {
                let page = state.connector.page().await?;
                page.go_back(self.navigation_timeout).await?;
                let url = page.current_url().await.unwrap_or_default();
                Ok(ToolOutput::Text(format!("Went back to {}", url)))
            }
            tools::SNAPSHOT => {
                let args: SnapshotArgs = parse_args(arguments)?;
                let compact = args.compact.unwrap_or(self.default_compact);
                let nodes = state.connector.page().await?.accessibility_tree().await?;

                let session = SnapshotSession::capture(&nodes, compact);
                tracing::debug!(
                    "Snapshot of {} nodes, {} refs (compact: {})",
                    nodes.len(),
                    session.ref_count(),
                    compact
                );
                let text = if session.text().is_empty() {
                    "(empty accessibility tree)".to_string()
                } else {
                    session.text().to_string()
                };
                state.snapshot = session;
                Ok(ToolOutput::Text(text))
            }
            tools::CLICK => {
                let args: ClickArgs = parse_args(arguments)?;
                // Stale refs fail before any browser work
                state.snapshot.lookup(&args.reference)?;

                let ServerState {
                    connector,
                    snapshot,
                } = &mut *state;
                let page = connector.page().await?;
                let locator = self.runner.click(page, snapshot, &args.reference).await?;
                Ok(ToolOutput::Text(format!(
                    "Clicked {} {} \"{}\"",
                    locator.token, locator.query.role, locator.query.name
                )))
            }
            tools::FILL => {
                let args: FillArgs = parse_args(arguments)?;
                state.snapshot.lookup(&args.reference)?;

                let ServerState {
                    connector,
                    snapshot,
                } = &mut *state;
                let page = connector.page().await?;
                let locator = self
                    .runner
                    .fill(page, snapshot, &args.reference, &args.value, args.press_enter)
                    .await?;
                Ok(ToolOutput::Text(format!(
                    "Filled {} {} \"{}\"{}",
                    locator.token,
                    locator.query.role,
                    locator.query.name,
                    if args.press_enter { " and pressed Enter" } else { "" }
                )))
            }
            tools::SELECT => {
                let args: SelectArgs = parse_args(arguments)?;
                state.snapshot.lookup(&args.reference)?;

                let ServerState {
                    connector,
                    snapshot,
                } = &mut *state;
                let page = connector.page().await?;
                let (locator, selected) = self
                    .runner
                    .select(page, snapshot, &args.reference, &args.values)
                    .await?;
                Ok(ToolOutput::Text(format!(
                    "Selected {:?} in {} {} \"{}\"",
                    selected, locator.token, locator.query.role, locator.query.name
                )))
            }
            tools::PRESS_KEY => {
                let args: PressKeyArgs = parse_args(arguments)?;
                if args.key.is_empty() {
                    return Err(AxbridgeError::InvalidArguments("key must not be empty".to_string()));
                }
                state.connector.page().await?.press_key(&args.key).await?;
                Ok(ToolOutput::Text(format!("Pressed {}", args.key)))
            }
            tools::SCREENSHOT => {
                let args: ScreenshotArgs = parse_args(arguments)?;
                let png = state.connector.page().await?.screenshot(args.full_page).await?;

                match args.path {
                    Some(path) => {
                        let path = shellexpand::tilde(&path).to_string();
                        write_file(Path::new(&path), &png)?;
                        Ok(ToolOutput::Text(format!(
                            "Screenshot saved to {} ({} bytes)",
                            path,
                            png.len()
                        )))
                    }
                    None => Ok(ToolOutput::Image {
                        caption: format!("Screenshot ({} bytes)", png.len()),
                        png,
                    }),
                }
            }
            tools::CLOSE => {
                let closed = state.connector.close().await?;
                state.snapshot = SnapshotSession::default();
                Ok(ToolOutput::Text(if closed {
                    "Browser closed".to_string()
                } else {
                    "No browser was running".to_string()
                }))
            }
            other => Err(AxbridgeError::InvalidArguments(format!("Unknown tool: {}", other))),
        }
    }

    /// Run a tool and fold failures into an error result
    pub async fn run_tool(&self, name: &str, arguments: Option<&JsonObject>) -> CallToolResult {
        match self.dispatch(name, arguments).await {
            Ok(ToolOutput::Text(text)) => CallToolResult::success(vec![Content::text(text)]),
            Ok(ToolOutput::Image { png, caption }) => CallToolResult::success(vec![
                Content::text(caption),
                Content::image(
                    base64::engine::general_purpose::STANDARD.encode(&png),
                    "image/png".to_string(),
                ),
            ]),
            Err(e) => {
                tracing::warn!("{} failed: {}", name, e);
                CallToolResult::error(vec![Content::text(error_text(&e))])
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

impl ServerHandler for BrowserServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Browser automation over the accessibility tree. Call browser_snapshot to see \
                 the page; interactive elements carry refs like [0-5]. Pass a ref to \
                 browser_click, browser_fill or browser_select. Refs expire with the next \
                 snapshot; on ref_not_found or element_not_found take a new snapshot."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: tool_definitions(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        tracing::debug!("Tool call: {}", request.name);
        Ok(self
            .run_tool(request.name.as_ref(), request.arguments.as_ref())
            .await)
    }
}
