use std::fs;
use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use serde_json::json;

use super::{effective_profile_name, ensure_cdp_override, load_config};
use crate::browser::{
    discover_all_browsers, normalize_url, PageConnector, SessionManager, SessionStatus,
};
use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::refs::SnapshotSession;

/// Config, session manager and `--cdp` override shared by every browser command
async fn prepare(cli: &Cli) -> Result<(Config, SessionManager)> {
    let config = load_config(cli)?;
    let sessions = SessionManager::new(config.clone());
    ensure_cdp_override(cli, &sessions).await?;
    Ok((config, sessions))
}

async fn open_connector(cli: &Cli) -> Result<(Config, PageConnector)> {
    let (config, sessions) = prepare(cli).await?;
    Ok((config, PageConnector::new(sessions, cli.profile.clone())))
}

pub async fn status(cli: &Cli) -> Result<()> {
    let (config, sessions) = prepare(cli).await?;
    let browsers = discover_all_browsers();
    let status = sessions.get_status(cli.profile.as_deref()).await?;

    if cli.json {
        let browsers: Vec<_> = browsers
            .iter()
            .map(|b| {
                json!({
                    "name": b.browser_type.name(),
                    "path": b.path.display().to_string(),
                    "version": b.version,
                })
            })
            .collect();
        let session = match &status {
            SessionStatus::Running {
                profile,
                cdp_port,
                cdp_url,
                cloud_session_id,
            } => json!({
                "profile": profile,
                "state": "running",
                "cdp_port": cdp_port,
                "cdp_url": cdp_url,
                "cloud_session_id": cloud_session_id,
            }),
            SessionStatus::Stale { profile } => json!({ "profile": profile, "state": "stale" }),
            SessionStatus::NotRunning { profile } => {
                json!({ "profile": profile, "state": "not_running" })
            }
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "browsers": browsers,
                "cloud": config.cloud.enabled,
                "session": session,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Detected Browsers:".bold());
    if browsers.is_empty() {
        println!("  {} No browsers found", "!".yellow());
    } else {
        for browser in &browsers {
            println!(
                "  {} {} {}",
                "✓".green(),
                browser.browser_type.name(),
                browser
                    .version
                    .as_ref()
                    .map(|v| format!("(v{})", v))
                    .unwrap_or_default()
                    .dimmed()
            );
            println!("    {}", browser.path.display().to_string().dimmed());
        }
    }
    println!();

    println!("{}", "Cloud:".bold());
    if config.cloud.enabled {
        let key_state = if config.cloud.api_key.is_some() {
            "API key configured".green()
        } else {
            "API key missing".yellow()
        };
        println!("  {} Enabled ({})", "✓".green(), key_state);
    } else {
        println!("  {} Disabled", "○".dimmed());
    }
    println!();

    println!("{}", "Session Status:".bold());
    match status {
        SessionStatus::Running {
            profile,
            cdp_port,
            cdp_url,
            cloud_session_id,
        } => {
            println!("  {} Profile: {}", "✓".green(), profile.cyan());
            if let Some(port) = cdp_port {
                println!("  {} CDP Port: {}", "✓".green(), port);
            }
            if let Some(id) = cloud_session_id {
                println!("  {} Cloud session: {}", "✓".green(), id);
            }
            println!("  {} CDP URL: {}", "✓".green(), cdp_url.dimmed());
        }
        SessionStatus::Stale { profile } => {
            println!(
                "  {} Profile: {} (stale session)",
                "!".yellow(),
                profile.cyan()
            );
        }
        SessionStatus::NotRunning { profile } => {
            println!(
                "  {} Profile: {} (not running)",
                "○".dimmed(),
                profile.cyan()
            );
        }
    }

    Ok(())
}

pub async fn goto(cli: &Cli, url: &str) -> Result<()> {
    let url = normalize_url(url)?;
    let (config, mut connector) = open_connector(cli).await?;
    let page = connector.page().await?;

    page.navigate(&url, Duration::from_millis(config.snapshot.navigation_timeout_ms))
        .await?;
    let title = page.title().await.unwrap_or_default();

    if cli.json {
        println!("{}", json!({ "success": true, "url": url, "title": title }));
    } else {
        println!("{} {}", "✓".green(), title.bold());
        println!("  {}", url.dimmed());
    }

    Ok(())
}

pub async fn snapshot(cli: &Cli, compact: bool) -> Result<()> {
    let (_config, mut connector) = open_connector(cli).await?;
    let nodes = connector.page().await?.accessibility_tree().await?;
    let session = SnapshotSession::capture(&nodes, compact);

    if cli.json {
        let mut refs = serde_json::Map::new();
        for (token, entry) in session.refs() {
            refs.insert(token.to_string(), serde_json::to_value(entry)?);
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "compact": session.compact(),
                "text": session.text(),
                "refs": refs,
            }))?
        );
    } else if session.text().is_empty() {
        println!("{}", "(empty accessibility tree)".dimmed());
    } else {
        println!("{}", session.text());
    }

    Ok(())
}

pub async fn screenshot(cli: &Cli, path: &str, full_page: bool) -> Result<()> {
    let (_config, mut connector) = open_connector(cli).await?;
    let png = connector.page().await?.screenshot(full_page).await?;

    let path = shellexpand::tilde(path).to_string();
    if let Some(parent) = Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&path, &png)?;

    if cli.json {
        println!(
            "{}",
            json!({ "success": true, "path": path, "fullPage": full_page, "bytes": png.len() })
        );
    } else {
        let mode = if full_page { " (full page)" } else { "" };
        println!("{} Screenshot saved{}: {}", "✓".green(), mode, path);
    }

    Ok(())
}

pub async fn connect(cli: &Cli, endpoint: &str) -> Result<()> {
    let config = load_config(cli)?;
    let profile_name = effective_profile_name(cli, &config);
    let sessions = SessionManager::new(config);
    let state = sessions.connect_external(Some(&profile_name), endpoint).await?;

    if cli.json {
        println!(
            "{}",
            json!({
                "success": true,
                "profile": state.profile_name,
                "cdp_port": state.cdp_port,
                "cdp_url": state.cdp_url
            })
        );
    } else {
        match state.cdp_port {
            Some(port) => println!("{} Connected to CDP at port {}", "✓".green(), port),
            None => println!("{} Connected to remote browser", "✓".green()),
        }
        println!("  WebSocket URL: {}", state.cdp_url);
        println!("  Profile: {}", state.profile_name);
    }

    Ok(())
}

pub async fn close(cli: &Cli) -> Result<()> {
    let (_config, sessions) = prepare(cli).await?;
    let closed = sessions.close_session(cli.profile.as_deref()).await?;

    if cli.json {
        println!("{}", json!({ "success": true, "closed": closed }));
    } else if closed {
        println!("{} Browser closed", "✓".green());
    } else {
        println!("{} No browser was running", "○".dimmed());
    }

    Ok(())
}
