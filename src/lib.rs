//! Agent Bridge - local HTTP/WebSocket bridge between an assistant and the host
//!
//! Exposes named actions, file editing, shell commands and SharePoint access
//! over two local transports.

pub mod actions;
pub mod auth;
pub mod config;
pub mod editor;
pub mod error;
pub mod graph;
pub mod server;
pub mod shell;

pub use actions::ActionRegistry;
pub use config::Config;
pub use error::{BridgeError, Result};
