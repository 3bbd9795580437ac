//! Action registry for Agent Bridge
//!
//! `ActionRegistry` owns the live mapping from action name to handler and is
//! shared (behind an `Arc`) by both transports. Registration follows
//! last-writer-wins semantics: a plugin that reuses an action name replaces
//! the earlier handler and its owner record.
//!
//! Lookups take a short read lock and clone the `Action` out; the handler is
//! awaited with no lock held, so slow actions never block dispatch or
//! registration.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{BridgeError, Result};

use super::types::{Action, ActionArgs, Plugin};

#[derive(Default)]
struct Entries {
    /// Action name to active action.
    actions: HashMap<String, Action>,
    /// Action name to the plugin that currently owns it.
    owners: HashMap<String, String>,
}

impl Entries {
    fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Registry of named actions, safe to share across tasks.
///
/// # Example
///
/// ```rust
/// use agent_bridge::actions::{Action, ActionArgs, ActionRegistry, Plugin};
///
/// # tokio_test::block_on(async {
/// let registry = ActionRegistry::new();
/// registry
///     .register(Plugin::new("demo").with_action(
///         "greet",
///         Action::from_fn(|args: ActionArgs| async move {
///             Ok(format!("Hello, {}!", args.str_or("name", "world")))
///         }),
///     ))
///     .await;
///
/// assert_eq!(registry.run("greet", None).await.unwrap(), "Hello, world!");
/// # });
/// ```
#[derive(Default)]
pub struct ActionRegistry {
    entries: RwLock<Entries>,
    timeout: Option<Duration>,
}

impl ActionRegistry {
    /// Create an empty registry with no invocation timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every invocation by `timeout` (`None` disables the bound).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register every action of `plugin`, replacing any existing handler
    /// under the same name.
    pub async fn register(&self, plugin: Plugin) {
        let (plugin_name, actions) = plugin.into_actions();
        let count = actions.len();

        let mut entries = self.entries.write().await;
        for (action_name, action) in actions {
            if let Some(previous) = entries
                .owners
                .insert(action_name.clone(), plugin_name.clone())
            {
                debug!(
                    action = %action_name,
                    previous = %previous,
                    plugin = %plugin_name,
                    "Action overridden"
                );
            }
            entries.actions.insert(action_name, action);
        }
        drop(entries);

        info!(plugin = %plugin_name, actions = count, "Registered plugin");
    }

    /// Registered action names, sorted ascending.
    pub async fn list(&self) -> Vec<String> {
        self.entries.read().await.sorted_names()
    }

    /// Whether an action with this name is registered.
    pub async fn has(&self, name: &str) -> bool {
        self.entries.read().await.actions.contains_key(name)
    }

    /// The plugin that currently owns `name`.
    pub async fn owner(&self, name: &str) -> Option<String> {
        self.entries.read().await.owners.get(name).cloned()
    }

    /// Number of registered actions.
    pub async fn len(&self) -> usize {
        self.entries.read().await.actions.len()
    }

    /// True when no actions are registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Describe a registered action (used by the CLI listing).
    pub async fn describe(&self, name: &str) -> Option<Action> {
        self.entries.read().await.actions.get(name).cloned()
    }

    /// Run the action registered under `name`.
    ///
    /// Omitted `args` behave exactly like an empty object. An unregistered
    /// name fails with [`BridgeError::UnknownAction`] listing every available
    /// action; handler failures are returned as-is.
    pub async fn run(&self, name: &str, args: Option<ActionArgs>) -> Result<String> {
        let action = {
            let entries = self.entries.read().await;
            match entries.actions.get(name) {
                Some(action) => action.clone(),
                None => {
                    return Err(BridgeError::UnknownAction {
                        name: name.to_string(),
                        available: entries.sorted_names(),
                    })
                }
            }
        };

        let args = action.prepare(name, args.unwrap_or_default())?;
        debug!(action = %name, args = args.len(), "Dispatching action");

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, action.invoke(args))
                .await
                .map_err(|_| {
                    BridgeError::Timeout(format!(
                        "Action '{}' timed out after {}s",
                        name,
                        limit.as_secs()
                    ))
                })?,
            None => action.invoke(args).await,
        }
    }
}
