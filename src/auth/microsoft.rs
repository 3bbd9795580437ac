//! OAuth 2.0 authorization-code flow against the Microsoft identity platform.

use std::sync::Arc;

use reqwest::{Client, Url};
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::error::{BridgeError, Result};

use super::{AuthState, TokenData};

/// Default identity authority.
pub const AUTHORITY: &str = "https://login.microsoftonline.com";

/// Delegated permissions requested at login.
pub const SCOPE: &str = "Files.ReadWrite.All Sites.ReadWrite.All offline_access";

/// Builds login URLs and exchanges callback codes for tokens.
#[derive(Debug, Clone)]
pub struct MicrosoftAuth {
    client: Client,
    client_id: String,
    tenant_id: String,
    redirect_uri: String,
    authority: String,
    state: Arc<AuthState>,
}

impl MicrosoftAuth {
    pub fn new(config: &Config, state: Arc<AuthState>) -> Self {
        Self {
            client: Client::new(),
            client_id: config.azure.client_id.clone(),
            tenant_id: config.azure.tenant_id.clone(),
            redirect_uri: config.redirect_uri(),
            authority: AUTHORITY.to_string(),
            state,
        }
    }

    /// Point the flow at a different authority (sovereign clouds, tests).
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    /// Both the client id and the tenant id are set.
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.tenant_id.is_empty()
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn state(&self) -> &Arc<AuthState> {
        &self.state
    }

    /// Authorization URL the user is redirected to.
    pub fn login_url(&self) -> Result<String> {
        let base = format!("{}/{}/oauth2/v2.0/authorize", self.authority, self.tenant_id);
        let url = Url::parse_with_params(
            &base,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", SCOPE),
                ("response_mode", "query"),
            ],
        )
        .map_err(|e| BridgeError::Config(format!("Invalid authorize URL: {}", e)))?;
        Ok(url.into())
    }

    /// Exchange an authorization `code` for a token and store it.
    pub async fn handle_callback(&self, code: &str) -> Result<TokenData> {
        let endpoint = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        let response = self
            .client
            .post(endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::action(format!("Token request failed: {}", e)))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| BridgeError::action(format!("Invalid token response: {}", e)))?;

        let token = parse_token_response(&body, chrono::Utc::now().timestamp_millis())?;
        self.state.set(token.clone()).await?;
        info!("Microsoft authentication successful");
        Ok(token)
    }
}

/// Turn a token endpoint payload into [`TokenData`]. `now_ms` anchors
/// `expires_in`.
fn parse_token_response(body: &Value, now_ms: i64) -> Result<TokenData> {
    let access_token = match body.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => {
            let message = body
                .get("error_description")
                .and_then(Value::as_str)
                .filter(|d| !d.is_empty())
                .unwrap_or("Auth failed");
            return Err(BridgeError::action(message));
        }
    };

    // Some tenants return expires_in as a string.
    let expires_in = body.get("expires_in").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_str().and_then(|s| s.parse::<i64>().ok()))
    });

    Ok(TokenData {
        access_token,
        refresh_token: body
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string),
        // An expiry that does not fit is treated as unknown.
        expires_at: expires_in
            .and_then(|secs| secs.checked_mul(1000))
            .and_then(|ms| now_ms.checked_add(ms)),
    })
}
