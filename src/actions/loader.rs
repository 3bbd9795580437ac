//! Plugin discovery and loading for Agent Bridge
//!
//! User plugins are JSON manifests dropped into the plugins directory. Each
//! manifest names the plugin and maps action names to one of three runners:
//!
//! - `reply`: a text template rendered from the arguments (no process)
//! - `program` + `args`: a binary spawned with an explicit argument vector
//! - `command`: a shell line; interpolated values are shell-quoted and
//!   chaining operators are rejected at load time
//!
//! ```json
//! {
//!   "name": "example",
//!   "description": "Example plugin",
//!   "actions": {
//!     "hello": {
//!       "reply": "Hello, {{name}}!",
//!       "params": { "name": { "type": "string", "default": "world" } }
//!     },
//!     "diskUsage": { "program": "du", "args": ["-sh", "{{path}}"] },
//!     "uptime": { "command": "uptime", "timeoutSecs": 10 }
//!   }
//! }
//! ```
//!
//! Loading never fails as a whole: a missing directory yields no plugins and
//! every bad manifest is logged and skipped. Files are visited in sorted
//! filename order so overrides between plugin files are deterministic.
//!
//! Manifests are a trust boundary: the commands they declare run with the
//! full privileges of the bridge process.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{BridgeError, Result};
use crate::shell;

use super::types::{Action, ActionArgs, ActionHandler, ParamKind, ParamSpec, Plugin};

/// File extension identifying a plugin manifest.
pub const MANIFEST_EXTENSION: &str = "json";

static PLUGIN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_\-]{0,63}$").unwrap());
static ACTION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{0,63}$").unwrap());
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").unwrap());

/// A plugin manifest as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub actions: BTreeMap<String, ManifestAction>,
}

/// One action entry in a manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAction {
    #[serde(default)]
    pub description: Option<String>,
    /// Text template returned without spawning anything.
    #[serde(default)]
    pub reply: Option<String>,
    /// Binary to spawn with `args`.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Shell command line template.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub params: BTreeMap<String, ManifestParam>,
}

/// Parameter declaration inside a manifest action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestParam {
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Load every valid plugin manifest in `dir`.
///
/// Returns an empty list when the directory does not exist. Non-manifest
/// files are ignored; invalid manifests are logged and skipped.
pub fn load_plugins(dir: &Path) -> Vec<Plugin> {
    if !dir.exists() {
        info!(dir = %dir.display(), "Plugin directory does not exist, skipping");
        return Vec::new();
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read plugin directory");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_manifest(path))
        .collect();
    files.sort();

    let mut plugins = Vec::new();
    for path in files {
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        match load_plugin_file(&path) {
            Ok(plugin) => {
                info!(
                    file = %file,
                    plugin = %plugin.name(),
                    actions = plugin.action_count(),
                    "Loaded plugin"
                );
                plugins.push(plugin);
            }
            Err(e) => {
                warn!(file = %file, error = %e, "Failed to load plugin, skipping");
            }
        }
    }

    plugins
}

/// Load and validate a single manifest file.
pub fn load_plugin_file(path: &Path) -> Result<Plugin> {
    let content = fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let raw: Value = serde_json::from_str(&content)?;
    let looks_like_plugin = raw
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty())
        && raw.get("actions").is_some_and(Value::is_object);
    if !looks_like_plugin {
        return Err(BridgeError::Config(format!(
            "{} does not define a valid plugin (needs a non-empty 'name' and an 'actions' object)",
            path.display()
        )));
    }

    let manifest: PluginManifest = serde_json::from_value(raw)?;
    validate_manifest(&manifest)?;
    Ok(build_plugin(manifest))
}

/// Validate a manifest for correctness and safety.
///
/// - Plugin name: 1-64 chars, alphanumeric, `-` or `_`
/// - At least one action
/// - Action names: start with a letter, alphanumeric or `_`
/// - Exactly one runner (`reply`, `program` or `command`) per action
/// - Shell command templates must not chain commands
pub fn validate_manifest(manifest: &PluginManifest) -> Result<()> {
    if !PLUGIN_NAME_RE.is_match(&manifest.name) {
        return Err(BridgeError::Config(format!(
            "Invalid plugin name '{}': must be 1-64 alphanumeric characters, hyphens or underscores",
            manifest.name
        )));
    }

    if manifest.actions.is_empty() {
        return Err(BridgeError::Config(format!(
            "Plugin '{}' must define at least one action",
            manifest.name
        )));
    }

    for (name, action) in &manifest.actions {
        if !ACTION_NAME_RE.is_match(name) {
            return Err(BridgeError::Config(format!(
                "Invalid action name '{}' in plugin '{}': must start with a letter and contain only alphanumerics and underscores",
                name, manifest.name
            )));
        }

        let runners = [
            action.reply.is_some(),
            action.program.is_some(),
            action.command.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if runners != 1 {
            return Err(BridgeError::Config(format!(
                "Action '{}' in plugin '{}' must set exactly one of 'reply', 'program' or 'command'",
                name, manifest.name
            )));
        }

        if action.program.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(BridgeError::Config(format!(
                "Action '{}' in plugin '{}' has an empty program",
                name, manifest.name
            )));
        }

        if let Some(command) = &action.command {
            validate_command_safety(command, name, &manifest.name)?;
        }
    }

    Ok(())
}

/// Reject shell templates that chain or substitute commands.
fn validate_command_safety(command: &str, action_name: &str, plugin_name: &str) -> Result<()> {
    let dangerous_patterns: &[(&str, &str)] = &[
        ("&&", "command chaining (&&)"),
        ("||", "conditional chaining (||)"),
        (";", "command separator (;)"),
        ("`", "backtick execution"),
        ("$(", "command substitution"),
    ];

    for (pattern, description) in dangerous_patterns {
        if command.contains(pattern) {
            return Err(BridgeError::SecurityViolation(format!(
                "Action '{}' in plugin '{}' contains dangerous pattern: {}",
                action_name, plugin_name, description
            )));
        }
    }

    // `||` is caught above; any remaining `|` is a pipe.
    if command.contains('|') {
        return Err(BridgeError::SecurityViolation(format!(
            "Action '{}' in plugin '{}' contains dangerous pattern: pipe operator (|)",
            action_name, plugin_name
        )));
    }

    Ok(())
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MANIFEST_EXTENSION))
}

fn build_plugin(manifest: PluginManifest) -> Plugin {
    let mut plugin = Plugin::new(manifest.name);
    if let Some(description) = manifest.description {
        plugin = plugin.with_description(description);
    }

    for (name, def) in manifest.actions {
        let runner = if let Some(template) = def.reply {
            Runner::Reply(template)
        } else if let Some(program) = def.program {
            Runner::Program {
                program,
                args: def.args,
            }
        } else {
            Runner::Shell(def.command.unwrap_or_default())
        };

        let handler = ManifestHandler {
            runner,
            working_dir: def.working_dir.map(PathBuf::from),
            timeout: def.timeout_secs.map(Duration::from_secs),
        };

        let mut action = Action::new(handler);
        if let Some(description) = def.description {
            action = action.with_description(description);
        }
        for (param_name, param) in def.params {
            action = action.with_param(ParamSpec {
                name: param_name,
                kind: param.kind,
                required: param.required,
                default: param.default,
                description: param.description,
            });
        }
        plugin = plugin.with_action(name, action);
    }

    plugin
}

#[derive(Debug)]
enum Runner {
    Reply(String),
    Program { program: String, args: Vec<String> },
    Shell(String),
}

/// Handler backing a manifest-declared action.
#[derive(Debug)]
struct ManifestHandler {
    runner: Runner,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

#[async_trait]
impl ActionHandler for ManifestHandler {
    async fn call(&self, args: ActionArgs) -> Result<String> {
        match &self.runner {
            Runner::Reply(template) => Ok(interpolate(template, &args, false)),
            Runner::Program { program, args: argv } => {
                let argv: Vec<String> = argv
                    .iter()
                    .map(|arg| interpolate(arg, &args, false))
                    .collect();
                shell::run_program(program, &argv, self.working_dir.as_deref(), self.timeout)
                    .await
            }
            Runner::Shell(template) => {
                let line = interpolate(template, &args, true);
                shell::run_shell(&line, self.working_dir.as_deref(), self.timeout).await
            }
        }
    }
}

/// Replace `{{name}}` placeholders with argument values. Absent arguments
/// render as the empty string.
fn interpolate(template: &str, args: &ActionArgs, quote: bool) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let value = args.display(&caps[1]).unwrap_or_default();
            if quote {
                shell::shell_quote(&value)
            } else {
                value
            }
        })
        .into_owned()
}
