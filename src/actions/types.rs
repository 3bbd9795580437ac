//! Action types for Agent Bridge
//!
//! This module defines the handler contract every action implements, the
//! typed argument view handed to handlers, the per-action parameter schema
//! checked at dispatch time, and the `Plugin` bundle that groups actions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

/// Arguments passed to an action: a JSON object with typed accessors.
///
/// An omitted argument payload is equivalent to an empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionArgs(Map<String, Value>);

impl ActionArgs {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary JSON value. `null` becomes an empty set; any
    /// other non-object is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(BridgeError::validation(format!(
                "args must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Insert or replace an argument, returning `self` for chaining.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Insert or replace an argument.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Raw JSON value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// `true` when `key` is present and not `null`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_null())
    }

    /// String argument, if present and actually a string.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// String argument with a fallback.
    pub fn str_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.str(key).unwrap_or(fallback)
    }

    /// Integer argument.
    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Boolean argument.
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Display form of an argument: strings as-is, other values as JSON,
    /// `None` for absent or `null`.
    pub fn display(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no arguments were given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ActionArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The JSON type a declared parameter accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl ParamKind {
    /// Whether `value` satisfies this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
            ParamKind::Any => true,
        }
    }

    fn article_name(&self) -> &'static str {
        match self {
            ParamKind::String => "a string",
            ParamKind::Number => "a number",
            ParamKind::Integer => "an integer",
            ParamKind::Boolean => "a boolean",
            ParamKind::Object => "an object",
            ParamKind::Array => "an array",
            ParamKind::Any => "any value",
        }
    }
}

/// A declared action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    /// Value filled in when the caller omits the argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// An optional parameter of the given kind.
    pub fn optional(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
            description: None,
        }
    }

    /// A parameter the caller must supply.
    pub fn required(name: &str, kind: ParamKind) -> Self {
        Self {
            required: true,
            ..Self::optional(name, kind)
        }
    }

    /// Attach a default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// The uniform handler contract: arguments in, one string out (or a failure).
///
/// Handlers are invoked concurrently and must not assume any ordering
/// between invocations.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, args: ActionArgs) -> Result<String>;
}

/// Adapter turning an async closure into an [`ActionHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    async fn call(&self, args: ActionArgs) -> Result<String> {
        (self.0)(args).await
    }
}

/// A registered action: handler plus its declared interface.
#[derive(Clone)]
pub struct Action {
    handler: Arc<dyn ActionHandler>,
    description: Option<String>,
    params: Vec<ParamSpec>,
}

impl Action {
    /// Wrap an [`ActionHandler`] implementation.
    pub fn new(handler: impl ActionHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            description: None,
            params: Vec::new(),
        }
    }

    /// Wrap an async closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self::new(FnHandler::new(f))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a parameter checked before every invocation.
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Check `args` against the declared parameters and fill in defaults.
    ///
    /// Undeclared arguments pass through untouched.
    pub fn prepare(&self, action_name: &str, mut args: ActionArgs) -> Result<ActionArgs> {
        for param in &self.params {
            match args.get(&param.name) {
                Some(value) if !value.is_null() => {
                    if !param.kind.accepts(value) {
                        return Err(BridgeError::validation(format!(
                            "Argument '{}' for action '{}' must be {}",
                            param.name,
                            action_name,
                            param.kind.article_name()
                        )));
                    }
                }
                _ => {
                    if let Some(default) = &param.default {
                        args.insert(&param.name, default.clone());
                    } else if param.required {
                        return Err(BridgeError::validation(format!(
                            "Missing required argument '{}' for action '{}'",
                            param.name, action_name
                        )));
                    }
                }
            }
        }
        Ok(args)
    }

    /// Invoke the handler directly, without schema checks.
    pub async fn invoke(&self, args: ActionArgs) -> Result<String> {
        self.handler.call(args).await
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("description", &self.description)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A named bundle of actions.
///
/// Plugin names need not be unique; collisions are resolved per action name
/// when plugins are registered.
#[derive(Debug, Clone)]
pub struct Plugin {
    name: String,
    description: Option<String>,
    actions: Vec<(String, Action)>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            actions: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an action. A second action with the same name replaces the first.
    pub fn with_action(mut self, name: impl Into<String>, action: Action) -> Self {
        let name = name.into();
        match self.actions.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = action,
            None => self.actions.push((name, action)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> impl Iterator<Item = (&str, &Action)> {
        self.actions.iter().map(|(name, action)| (name.as_str(), action))
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub(crate) fn into_actions(self) -> (String, Vec<(String, Action)>) {
        (self.name, self.actions)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
