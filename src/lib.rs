//! Accessibility-tree browser automation for MCP clients.
//!
//! A page is rendered as an indented accessibility snapshot whose
//! interactive elements carry short refs (`[0-5]`). Tools such as click and
//! fill take one of those refs and resolve it back to a live element by role,
//! name and position.

pub mod browser;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;
pub mod refs;

pub use error::{AxbridgeError, Result};
