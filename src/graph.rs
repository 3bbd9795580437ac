//! Microsoft Graph client and the SharePoint drive operations built on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use reqwest::{header, Client, Method};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::AuthState;
use crate::editor;
use crate::error::{BridgeError, Result};

/// Graph REST root.
pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

const USER_AGENT: &str = concat!("AgentBridge/", env!("CARGO_PKG_VERSION"));
const DEFAULT_SITE: &str = "root";
const DEFAULT_DOWNLOAD_NAME: &str = "sharepoint-file";

/// Request payload for [`GraphClient::fetch`].
#[derive(Debug, Clone, Default)]
pub enum GraphBody {
    #[default]
    None,
    Json(Value),
    /// Sent as `application/octet-stream`.
    Bytes(Vec<u8>),
}

/// A Graph response: parsed JSON when the server says so, raw bytes otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphResponse {
    Json(Value),
    Bytes(Vec<u8>),
}

impl GraphResponse {
    /// JSON view of the response. Byte payloads become a (lossy) string.
    pub fn into_json(self) -> Value {
        match self {
            GraphResponse::Json(value) => value,
            GraphResponse::Bytes(bytes) if bytes.is_empty() => Value::Null,
            GraphResponse::Bytes(bytes) => {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            GraphResponse::Json(value) => value.to_string().into_bytes(),
            GraphResponse::Bytes(bytes) => bytes,
        }
    }
}

/// How upload content is encoded in the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentEncoding {
    #[default]
    Utf8,
    Base64,
}

impl ContentEncoding {
    /// `"base64"` selects base64; anything else is UTF-8.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(n) if n.eq_ignore_ascii_case("base64") => ContentEncoding::Base64,
            _ => ContentEncoding::Utf8,
        }
    }

    pub fn decode(self, content: &str) -> Result<Vec<u8>> {
        match self {
            ContentEncoding::Utf8 => Ok(content.as_bytes().to_vec()),
            ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(content.trim())
                .map_err(|e| BridgeError::validation(format!("Invalid base64 content: {}", e))),
        }
    }
}

/// Authenticated Graph client. Reads the bearer token from [`AuthState`] on
/// every request, so a login takes effect without a restart.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: Client,
    base_url: String,
    auth: Arc<AuthState>,
}

impl GraphClient {
    pub fn new(auth: Arc<AuthState>) -> Self {
        Self {
            client: Client::new(),
            base_url: GRAPH_BASE.to_string(),
            auth,
        }
    }

    /// Override the API root (national clouds, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Issue one Graph request. `path` is relative to the API root.
    pub async fn fetch(&self, path: &str, method: Method, body: GraphBody) -> Result<GraphResponse> {
        let token = self
            .auth
            .access_token()
            .await
            .ok_or(BridgeError::NotAuthenticated)?;

        let url = if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        };
        debug!(%method, %url, "Graph request");

        let request = self
            .client
            .request(method, &url)
            .bearer_auth(token)
            .header(header::USER_AGENT, USER_AGENT);
        let request = match body {
            GraphBody::None => request,
            GraphBody::Json(value) => request.json(&value),
            GraphBody::Bytes(bytes) => request
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes),
        };

        let response = request
            .send()
            .await
            .map_err(|e| BridgeError::action(format!("Graph request failed: {}", e)))?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::action(format!("Graph response read failed: {}", e)))?;

        if !status.is_success() {
            return Err(BridgeError::action(format!(
                "Graph API error {}: {}",
                status,
                String::from_utf8_lossy(&bytes)
            )));
        }

        if is_json && !bytes.is_empty() {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| BridgeError::action(format!("Invalid Graph JSON: {}", e)))?;
            Ok(GraphResponse::Json(value))
        } else {
            Ok(GraphResponse::Bytes(bytes.to_vec()))
        }
    }

    /// List the children of a drive folder (the drive root when `folder_id`
    /// is absent).
    pub async fn list_children(&self, site_id: Option<&str>, folder_id: Option<&str>) -> Result<Value> {
        let path = children_path(site_id, folder_id);
        Ok(self.fetch(&path, Method::GET, GraphBody::None).await?.into_json())
    }

    /// Download an item into the temp dir, open it, and return its path.
    pub async fn open_item(
        &self,
        site_id: Option<&str>,
        item_id: &str,
        file_name: Option<&str>,
    ) -> Result<PathBuf> {
        let path = format!("/sites/{}/drive/items/{}/content", site(site_id), item_id);
        let content = self.fetch(&path, Method::GET, GraphBody::None).await?.into_bytes();

        let target = temp_target(&std::env::temp_dir(), file_name);
        tokio::fs::write(&target, content).await?;
        info!(file = %target.display(), "Downloaded SharePoint item");
        editor::open(&target);
        Ok(target)
    }

    /// Upload `content` as `file_name` into the drive root or a folder.
    pub async fn upload(
        &self,
        site_id: Option<&str>,
        folder_id: Option<&str>,
        file_name: &str,
        content: &str,
        encoding: ContentEncoding,
    ) -> Result<Value> {
        let bytes = encoding.decode(content)?;
        let path = upload_path(site_id, folder_id, file_name);
        Ok(self
            .fetch(&path, Method::PUT, GraphBody::Bytes(bytes))
            .await?
            .into_json())
    }

    /// Arbitrary Graph call. `method` defaults to GET.
    pub async fn query(&self, path: &str, method: Option<&str>, body: Option<Value>) -> Result<Value> {
        let method = parse_method(method)?;
        let body = match body {
            Some(Value::Null) | None => GraphBody::None,
            Some(value) => GraphBody::Json(value),
        };
        Ok(self.fetch(path, method, body).await?.into_json())
    }
}

fn site(site_id: Option<&str>) -> &str {
    site_id.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SITE)
}

/// Graph path listing a folder's children.
pub fn children_path(site_id: Option<&str>, folder_id: Option<&str>) -> String {
    match folder_id.filter(|f| !f.is_empty()) {
        Some(folder) => format!("/sites/{}/drive/items/{}/children", site(site_id), folder),
        None => format!("/sites/{}/drive/root/children", site(site_id)),
    }
}

/// Graph path for a simple (single request) upload.
pub fn upload_path(site_id: Option<&str>, folder_id: Option<&str>, file_name: &str) -> String {
    match folder_id.filter(|f| !f.is_empty()) {
        Some(folder) => format!(
            "/sites/{}/drive/items/{}:/{}:/content",
            site(site_id),
            folder,
            file_name
        ),
        None => format!("/sites/{}/drive/root:/{}:/content", site(site_id), file_name),
    }
}

fn parse_method(method: Option<&str>) -> Result<Method> {
    match method.filter(|m| !m.is_empty()) {
        None => Ok(Method::GET),
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .map_err(|_| BridgeError::validation(format!("Invalid HTTP method: {}", m))),
    }
}

/// Local destination for a downloaded item. Only the final path component
/// of `file_name` is used.
fn temp_target(dir: &Path, file_name: Option<&str>) -> PathBuf {
    let name = file_name
        .and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_DOWNLOAD_NAME);
    dir.join(name)
}
