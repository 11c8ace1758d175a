pub mod browser;
pub mod config;
pub mod serve;

use crate::browser::SessionManager;
use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;

/// Load the layered config and fold the global CLI flags on top
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load()?;
    apply_overrides(cli, &mut config);
    Ok(config)
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(ref path) = cli.browser_path {
        config.browser.executable = Some(path.clone());
    }
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(ref key) = cli.api_key {
        config.cloud.api_key = Some(key.clone());
    }
    if cli.cloud {
        config.cloud.enabled = true;
    }

    // Explicitly configured profiles still honor the command line
    let profile_name = effective_profile_name(cli, config);
    if let Some(profile) = config.profiles.get_mut(&profile_name) {
        if let Some(ref path) = cli.browser_path {
            profile.browser_path = Some(path.clone());
        }
        if cli.headless {
            profile.headless = true;
        }
    }
}

pub fn effective_profile_name(cli: &Cli, config: &Config) -> String {
    cli.profile
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| config.effective_default_profile_name())
}

/// With `--cdp`, record the endpoint as the profile's session so every
/// later connection reuses that browser. No-op otherwise.
pub async fn ensure_cdp_override(cli: &Cli, sessions: &SessionManager) -> Result<()> {
    let Some(ref endpoint) = cli.cdp else {
        return Ok(());
    };

    let state = sessions
        .connect_external(cli.profile.as_deref(), endpoint)
        .await?;
    tracing::debug!(
        "CDP override applied: url={}, profile={}",
        state.cdp_url,
        state.profile_name
    );
    Ok(())
}
