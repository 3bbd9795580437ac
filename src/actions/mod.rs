//! Action system for Agent Bridge
//!
//! Actions are named, asynchronous operations taking a JSON argument object
//! and producing one string. They are grouped into plugins and dispatched
//! through a single shared [`ActionRegistry`].
//!
//! # Architecture
//!
//! - **types**: Handler contract and data (`ActionHandler`, `Action`, `ActionArgs`, `ParamSpec`, `Plugin`)
//! - **registry**: Name to handler table with last-registration-wins semantics
//! - **loader**: Discovery of JSON plugin manifests from a directory
//! - **builtins**: The always-present development actions
//!
//! # Registration order
//!
//! ```text
//! builtins ──► plugins/10-team.json ──► plugins/20-local.json
//!    (first)        (sorted filename order, later files win)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use agent_bridge::actions::{builtins_plugin, load_plugins, ActionRegistry};
//!
//! # async fn demo() {
//! let registry = ActionRegistry::new();
//! registry.register(builtins_plugin()).await;
//! for plugin in load_plugins(Path::new("./plugins")) {
//!     registry.register(plugin).await;
//! }
//!
//! let status = registry.run("gitStatus", None).await;
//! # }
//! ```

pub mod builtins;
mod loader;
pub mod registry;
pub mod types;

pub use builtins::{builtins_plugin, BUILTINS_PLUGIN};
pub use loader::{
    load_plugin_file, load_plugins, validate_manifest, ManifestAction, ManifestParam,
    PluginManifest,
};
pub use registry::ActionRegistry;
pub use types::{Action, ActionArgs, ActionHandler, FnHandler, ParamKind, ParamSpec, Plugin};
