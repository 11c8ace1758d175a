use clap::{Parser, Subcommand};

use crate::commands;
use crate::error::Result;

/// axbridge - accessibility-tree browser tools for MCP clients
#[derive(Parser)]
#[command(name = "axbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Browser executable path (overrides auto-discovery)
    #[arg(long, env = "AXBRIDGE_BROWSER_PATH", global = true)]
    pub browser_path: Option<String>,

    /// CDP port or WebSocket URL of an already running browser
    #[arg(long, env = "AXBRIDGE_CDP", global = true)]
    pub cdp: Option<String>,

    /// Profile name to use
    #[arg(short = 'P', long, env = "AXBRIDGE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Run in headless mode
    #[arg(long, env = "AXBRIDGE_HEADLESS", global = true)]
    pub headless: bool,

    /// API key for the cloud browser provider
    #[arg(long, env = "AXBRIDGE_API_KEY", global = true)]
    pub api_key: Option<String>,

    /// Use a cloud browser session instead of a local browser
    #[arg(long, env = "AXBRIDGE_CLOUD", global = true)]
    pub cloud: bool,

    /// Output in JSON format
    #[arg(long, env = "AXBRIDGE_JSON", global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, env = "AXBRIDGE_VERBOSE", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server on stdin/stdout
    Serve,

    /// Show detected browsers and the profile's session
    Status,

    /// Navigate the current page to a URL
    Goto {
        /// URL to navigate to
        url: String,
    },

    /// Print the accessibility snapshot of the current page
    Snapshot {
        /// Keep unnamed structural wrappers
        #[arg(long)]
        full: bool,
    },

    /// Take a screenshot
    Screenshot {
        /// Output file path
        #[arg(default_value = "screenshot.png")]
        path: String,
        /// Capture the whole scrollable page
        #[arg(long)]
        full_page: bool,
    },

    /// Connect to an existing browser
    Connect {
        /// CDP endpoint (port or WebSocket URL)
        endpoint: String,
    },

    /// Close the browser
    Close,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g. snapshot.fallback)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show configuration file path
    Path,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Serve => commands::serve::run(self).await,
            Commands::Status => commands::browser::status(self).await,
            Commands::Goto { url } => commands::browser::goto(self, url).await,
            Commands::Snapshot { full } => commands::browser::snapshot(self, !*full).await,
            Commands::Screenshot { path, full_page } => {
                commands::browser::screenshot(self, path, *full_page).await
            }
            Commands::Connect { endpoint } => commands::browser::connect(self, endpoint).await,
            Commands::Close => commands::browser::close(self).await,
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }
}
