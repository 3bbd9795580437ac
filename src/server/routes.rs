//! HTTP route handlers.
//!
//! Bodies and queries are taken as `Result<_, Rejection>` so malformed input
//! still produces a JSON `{ "error": ... }` response.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::actions::ActionArgs;
use crate::editor;
use crate::error::BridgeError;
use crate::graph::ContentEncoding;
use crate::shell;

use super::error::ApiError;
use super::AppState;

type ApiResult<T> = Result<T, ApiError>;

const AUTH_SUCCESS_PAGE: &str =
    r#"<h2 style="font-family:sans-serif">Authenticated with Microsoft! You can close this tab.</h2>"#;

/// First non-empty value among `candidates`, or a validation error.
fn require<'a>(candidates: &[&'a Option<String>], message: &str) -> ApiResult<&'a str> {
    candidates
        .iter()
        .copied()
        .filter_map(|c| c.as_deref())
        .find(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

// ============================================================================
// Ping & actions
// ============================================================================

pub async fn ping(State(state): State<AppState>) -> Json<Value> {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    Json(json!({
        "pong": true,
        "auth": state.auth.state().is_authenticated().await,
        "cwd": cwd,
    }))
}

pub async fn list_actions(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "actions": state.registry.list().await }))
}

#[derive(Debug, Deserialize)]
pub struct RunActionRequest {
    action: Option<String>,
    #[serde(default)]
    args: Value,
}

pub async fn run_action(
    State(state): State<AppState>,
    payload: Result<Json<RunActionRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let action = require(&[&request.action], "action required")?;
    let args = ActionArgs::from_value(request.args)?;

    let result = state.registry.run(action, Some(args)).await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

// ============================================================================
// Editor
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    file: Option<String>,
    path: Option<String>,
}

pub async fn editor_content(
    query: Result<Query<ContentQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let target = require(&[&query.file, &query.path], "file query param required")?;
    let resolved = editor::resolve(target);
    let content = editor::read(&resolved).await?;
    Ok(Json(json!({
        "content": content,
        "file": resolved.display().to_string(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    file: Option<String>,
    path: Option<String>,
    text: Option<String>,
    line: Option<usize>,
}

pub async fn editor_insert(
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let target = require(&[&request.file, &request.path], "file or path required")?;
    let resolved = editor::resolve(target);
    editor::insert(&resolved, request.text.as_deref().unwrap_or(""), request.line).await?;
    Ok(Json(json!({ "ok": true, "file": resolved.display().to_string() })))
}

pub async fn editor_replace(
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let target = require(&[&request.file, &request.path], "file or path required")?;
    let resolved = editor::resolve(target);
    editor::replace(&resolved, request.text.as_deref().unwrap_or("")).await?;
    Ok(Json(json!({ "ok": true, "file": resolved.display().to_string() })))
}

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    path: Option<String>,
}

pub async fn editor_open(
    payload: Result<Json<OpenRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let target = require(&[&request.path], "path required")?;
    let resolved = editor::resolve(target);
    editor::open(&resolved);
    Ok(Json(json!({ "ok": true, "path": resolved.display().to_string() })))
}

// ============================================================================
// Terminal
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TerminalRequest {
    command: Option<String>,
}

pub async fn terminal_run(
    State(state): State<AppState>,
    payload: Result<Json<TerminalRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let command = require(&[&request.command], "command required")?;
    let output = shell::run_shell(command, None, state.config.action_timeout()).await?;
    Ok(Json(json!({ "ok": true, "output": output })))
}

// ============================================================================
// Microsoft auth
// ============================================================================

pub async fn auth_login(State(state): State<AppState>) -> ApiResult<Response> {
    if !state.auth.is_configured() {
        return Err(ApiError::not_implemented(
            "Azure credentials not configured in config.json",
        ));
    }
    let url = state.auth.login_url()?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
}

pub async fn auth_callback(
    State(state): State<AppState>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> ApiResult<Html<&'static str>> {
    let Query(query) = query?;
    let code = require(&[&query.code], "No code in callback")?;
    state
        .auth
        .handle_callback(code)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Html(AUTH_SUCCESS_PAGE))
}

// ============================================================================
// SharePoint
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesQuery {
    site_id: Option<String>,
    folder_id: Option<String>,
}

pub async fn sharepoint_files(
    State(state): State<AppState>,
    query: Result<Query<FilesQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let data = state
        .graph
        .list_children(query.site_id.as_deref(), query.folder_id.as_deref())
        .await?;
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenItemRequest {
    site_id: Option<String>,
    item_id: Option<String>,
    file_name: Option<String>,
}

pub async fn sharepoint_open(
    State(state): State<AppState>,
    payload: Result<Json<OpenItemRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let item_id = require(&[&request.item_id], "itemId required")?;
    let tmp_path = state
        .graph
        .open_item(
            request.site_id.as_deref(),
            item_id,
            request.file_name.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "ok": true, "tmpPath": tmp_path.display().to_string() })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    site_id: Option<String>,
    folder_id: Option<String>,
    file_name: Option<String>,
    #[serde(default)]
    content: String,
    encoding: Option<String>,
}

pub async fn sharepoint_upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let file_name = require(&[&request.file_name], "fileName required")?;
    let item = state
        .graph
        .upload(
            request.site_id.as_deref(),
            request.folder_id.as_deref(),
            file_name,
            &request.content,
            ContentEncoding::from_name(request.encoding.as_deref()),
        )
        .await?;
    Ok(Json(json!({ "ok": true, "item": item })))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    path: Option<String>,
    method: Option<String>,
    body: Option<Value>,
}

pub async fn sharepoint_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;
    let path = require(&[&request.path], "path required")?;
    let data = state
        .graph
        .query(path, request.method.as_deref(), request.body)
        .await?;
    Ok(Json(json!({ "ok": true, "data": data })))
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::from(BridgeError::NotFound("Not found".to_string()))
}
