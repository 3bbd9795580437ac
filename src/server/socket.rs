//! WebSocket transport.
//!
//! Every inbound text frame is handled on its own task so a slow action does
//! not hold up later messages on the same connection. Replies go through a
//! per-connection channel to a single writer task.

use std::path::PathBuf;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::actions::ActionArgs;
use crate::editor;
use crate::error::{BridgeError, Result};
use crate::shell;

use super::AppState;

const OUTBOUND_BUFFER: usize = 64;

/// Greeting sent as soon as a client connects.
pub fn connected_event() -> Value {
    json!({ "event": "connected", "message": "Agent Bridge ready" })
}

/// Fields of `editor.content`.
#[derive(Debug, Deserialize)]
struct ContentRequest {
    file: Option<String>,
    path: Option<String>,
}

/// Fields of `editor.insert`.
#[derive(Debug, Deserialize)]
struct InsertRequest {
    file: Option<String>,
    path: Option<String>,
    text: Option<String>,
    line: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TerminalRequest {
    command: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: Option<String>,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesRequest {
    site_id: Option<String>,
    folder_id: Option<String>,
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection = Uuid::new_v4();
    info!(%connection, "Socket client connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Value>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        if sender
            .send(Message::Text(connected_event().to_string()))
            .await
            .is_err()
        {
            return;
        }
        while let Some(reply) = rx.recv().await {
            if sender.send(Message::Text(reply.to_string())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                let state = state.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = handle_text(&state, &text).await {
                        let _ = tx.send(reply).await;
                    }
                });
            }
            Message::Close(_) => break,
            other => trace!(%connection, ?other, "Ignoring non-text frame"),
        }
    }

    // In-flight tasks hold sender clones; the writer drains them and exits.
    drop(tx);
    let _ = writer.await;
    info!(%connection, "Socket client disconnected");
}

/// Produce the reply for one text frame. Non-JSON input gets no reply.
pub(crate) async fn handle_text(state: &AppState, text: &str) -> Option<Value> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Dropping non-JSON socket message");
            return None;
        }
    };

    let id = value.get("id").cloned();
    let outcome = match message_type(&value) {
        Ok(kind) => dispatch(state, &kind, value).await,
        Err(e) => Err(e),
    };

    let mut reply = Map::new();
    if let Some(id) = id {
        reply.insert("id".to_string(), id);
    }
    match outcome {
        Ok(fields) => {
            reply.insert("ok".to_string(), Value::Bool(true));
            reply.extend(fields);
        }
        Err(e) => {
            reply.insert("error".to_string(), Value::String(e.to_string()));
        }
    }
    Some(Value::Object(reply))
}

/// The `type` field. Absent or null reads as the empty type.
fn message_type(value: &Value) -> Result<String> {
    match value.get("type") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(kind)) => Ok(kind.clone()),
        Some(other) => Err(BridgeError::validation(format!(
            "Invalid message: type must be a string, got {}",
            other
        ))),
    }
}

/// Deserialize only the fields one message type reads. Anything else in the
/// frame is ignored.
fn fields_of<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| BridgeError::validation(format!("Invalid message: {}", e)))
}

fn required<'a>(field: &'a Option<String>, message: &str) -> Result<&'a str> {
    field
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BridgeError::validation(message))
}

fn editor_target(file: Option<String>, path: Option<String>) -> Result<PathBuf> {
    let target = file.filter(|f| !f.is_empty()).or(path);
    Ok(editor::resolve(required(&target, "file or path required")?))
}

async fn dispatch(state: &AppState, kind: &str, value: Value) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    match kind {
        "editor.content" => {
            let request: ContentRequest = fields_of(value)?;
            let resolved = editor_target(request.file, request.path)?;
            let content = editor::read_optional(&resolved).await?;
            fields.insert("content".into(), content.map(Value::String).unwrap_or(Value::Null));
            fields.insert("file".into(), Value::String(resolved.display().to_string()));
        }
        "editor.insert" => {
            let request: InsertRequest = fields_of(value)?;
            let resolved = editor_target(request.file, request.path)?;
            let text = request.text.unwrap_or_default();
            editor::insert(&resolved, &text, request.line).await?;
        }
        "terminal.run" => {
            let request: TerminalRequest = fields_of(value)?;
            let command = required(&request.command, "command required")?;
            let output = shell::run_shell(command, None, state.config.action_timeout()).await?;
            fields.insert("output".into(), Value::String(output));
        }
        "action.run" => {
            let request: ActionRequest = fields_of(value)?;
            let action = required(&request.action, "action required")?;
            let args = ActionArgs::from_value(request.args.unwrap_or(Value::Null))?;
            let result = state.registry.run(action, Some(args)).await?;
            fields.insert("result".into(), Value::String(result));
        }
        "sharepoint.files" => {
            let request: FilesRequest = fields_of(value)?;
            let data = state
                .graph
                .list_children(request.site_id.as_deref(), request.folder_id.as_deref())
                .await?;
            fields.insert("data".into(), data);
        }
        other => {
            return Err(BridgeError::validation(format!("Unknown type: {}", other)));
        }
    }
    Ok(fields)
}
