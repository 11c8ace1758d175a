//! MCP surface: tool schemas plus the stdio server that dispatches them.

mod server;
mod tools;

pub use server::{BrowserServer, ToolOutput};
pub use tools::{error_text, parse_args, tool_definitions};
pub use tools::{BACK, CLICK, CLOSE, FILL, NAVIGATE, PRESS_KEY, SCREENSHOT, SELECT, SNAPSHOT};
