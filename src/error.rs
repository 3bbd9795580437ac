//! Error types for Agent Bridge
//!
//! This module defines all error types used throughout the bridge.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Handler failures (`Action`) render their message verbatim so that both
//! transports can surface exactly what the handler reported.

use thiserror::Error;

/// The primary error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration-related errors (invalid config, bad manifest, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required request field is missing or has the wrong shape.
    #[error("{0}")]
    Validation(String),

    /// No handler is registered under the requested action name.
    #[error("Unknown action: {name}. Available: {}", available.join(", "))]
    UnknownAction {
        name: String,
        available: Vec<String>,
    },

    /// No Microsoft access token is present.
    #[error("Not authenticated with Microsoft. Call /auth/login first.")]
    NotAuthenticated,

    /// Handler or external failure (non-zero exit, upstream API error, ...)
    #[error("{0}")]
    Action(String),

    /// An action or command exceeded its time budget.
    #[error("{0}")]
    Timeout(String),

    /// Referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Security violations (dangerous shell operators in a manifest, etc.)
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BridgeError {
    /// Shorthand for a handler failure carrying `message` unchanged.
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action(message.into())
    }

    /// Shorthand for a missing/invalid request field.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// A specialized `Result` type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
