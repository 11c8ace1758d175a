use super::{ensure_cdp_override, load_config};
use crate::browser::SessionManager;
use crate::cli::Cli;
use crate::error::Result;
use crate::mcp::BrowserServer;

/// Run the MCP server until the client hangs up. stdout carries the
/// protocol, so nothing here prints.
pub async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    ensure_cdp_override(cli, &SessionManager::new(config.clone())).await?;

    tracing::info!(
        "Starting MCP server (profile: {}, fallback: {})",
        super::effective_profile_name(cli, &config),
        config.snapshot.fallback
    );

    BrowserServer::new(config, cli.profile.clone())
        .serve_stdio()
        .await
}
