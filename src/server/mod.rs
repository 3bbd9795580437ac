//! HTTP and WebSocket transports.
//!
//! Two listeners share one [`AppState`]:
//!
//! ```text
//! http://{host}:{httpPort}  ──► http_router   (REST-style JSON API)
//! ws://{host}:{wsPort}/     ──► socket_router (JSON messages over WebSocket)
//!                                    │
//!                    ActionRegistry ◄┴► editor / shell / GraphClient
//! ```
//!
//! Both routers answer any origin with `GET`, `POST` and `OPTIONS`.

mod error;
mod routes;
mod socket;

pub use error::ApiError;
pub use socket::connected_event;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::actions::ActionRegistry;
use crate::auth::MicrosoftAuth;
use crate::config::Config;
use crate::error::Result;
use crate::graph::GraphClient;

/// Everything a request handler may touch.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ActionRegistry>,
    pub auth: MicrosoftAuth,
    pub graph: GraphClient,
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Router for the request/response API.
pub fn http_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(routes::ping))
        .route("/actions/list", get(routes::list_actions))
        .route("/actions/run", post(routes::run_action))
        .route("/editor/content", get(routes::editor_content))
        .route("/editor/insert", post(routes::editor_insert))
        .route("/editor/replace", post(routes::editor_replace))
        .route("/editor/open", post(routes::editor_open))
        .route("/terminal/run", post(routes::terminal_run))
        .route("/auth/login", get(routes::auth_login))
        .route("/auth/callback", get(routes::auth_callback))
        .route("/sharepoint/files", get(routes::sharepoint_files))
        .route("/sharepoint/open", post(routes::sharepoint_open))
        .route("/sharepoint/upload", post(routes::sharepoint_upload))
        .route("/sharepoint/query", post(routes::sharepoint_query))
        .fallback(routes::not_found)
        .layer(cors())
        .with_state(state)
}

/// Router for the WebSocket transport.
pub fn socket_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(socket::ws_upgrade))
        .layer(cors())
        .with_state(state)
}

/// Bound listeners, ready to serve.
pub struct Listeners {
    http: TcpListener,
    socket: TcpListener,
}

impl Listeners {
    /// Bind both ports from `config`.
    pub async fn bind(config: &Config) -> Result<Self> {
        let http = TcpListener::bind((config.host.as_str(), config.http_port)).await?;
        let socket = TcpListener::bind((config.host.as_str(), config.ws_port)).await?;
        Ok(Self { http, socket })
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.http.local_addr()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// Serve both routers until `shutdown` resolves, then drain both.
pub async fn serve<F>(state: AppState, listeners: Listeners, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    });

    let stopped = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    info!(addr = %listeners.http_addr()?, "HTTP server listening");
    info!(addr = %listeners.socket_addr()?, "Socket server listening");

    let http = axum::serve(listeners.http, http_router(state.clone()))
        .with_graceful_shutdown(stopped(stop_rx.clone()));
    let socket = axum::serve(listeners.socket, socket_router(state))
        .with_graceful_shutdown(stopped(stop_rx));

    let (http_result, socket_result) = tokio::join!(http, socket);
    http_result?;
    socket_result?;
    info!("Servers stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{builtins_plugin, Action, ActionArgs, Plugin};
    use crate::auth::{AuthState, TokenStore};
    use crate::error::BridgeError;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
    use tower::ServiceExt;

    async fn test_state(tmp: &TempDir, config: Config) -> AppState {
        let registry = ActionRegistry::new();
        registry.register(builtins_plugin()).await;
        registry
            .register(
                Plugin::new("test")
                    .with_action(
                        "greet",
                        Action::from_fn(|args: ActionArgs| async move {
                            Ok(format!("hello {}", args.str_or("name", "world")))
                        }),
                    )
                    .with_action(
                        "fail",
                        Action::from_fn(|_args: ActionArgs| async move {
                            Err(BridgeError::action("intentional failure"))
                        }),
                    ),
            )
            .await;

        let auth_state = Arc::new(AuthState::empty(TokenStore::new(
            tmp.path().join(".tokens.json"),
        )));
        AppState {
            auth: MicrosoftAuth::new(&config, auth_state.clone()),
            graph: GraphClient::new(auth_state),
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, get_req("/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pong"], true);
        assert_eq!(body["auth"], false);
        assert!(body["cwd"].is_string());
    }

    #[tokio::test]
    async fn test_list_actions_sorted() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, get_req("/actions/list")).await;
        assert_eq!(status, StatusCode::OK);

        let names: Vec<String> = serde_json::from_value(body["actions"].clone()).unwrap();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"greet".to_string()));
        assert!(names.contains(&"gitStatus".to_string()));
    }

    #[tokio::test]
    async fn test_run_action() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(
            app,
            post_json("/actions/run", json!({"action": "greet", "args": {"name": "bridge"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "result": "hello bridge"}));
    }

    #[tokio::test]
    async fn test_run_action_missing_name() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, post_json("/actions/run", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "action required"}));
    }

    #[tokio::test]
    async fn test_run_unknown_action_is_404() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, post_json("/actions/run", json!({"action": "nope"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Unknown action: nope. Available: "));
        assert!(body["actions"].is_array());
    }

    #[tokio::test]
    async fn test_run_failing_action_is_500() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, post_json("/actions/run", json!({"action": "fail"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "intentional failure"}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_400() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let request = Request::post("/actions/run")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_editor_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("notes.txt");
        let file_str = file.display().to_string();
        let state = test_state(&tmp, Config::default()).await;

        let (status, _) = send(
            http_router(state.clone()),
            post_json("/editor/replace", json!({"file": file_str, "text": "a\nc"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            http_router(state.clone()),
            post_json("/editor/insert", json!({"path": file_str, "text": "b", "line": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["file"], file_str);

        let (status, body) = send(
            http_router(state),
            get_req(&format!("/editor/content?file={}", file_str)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "a\nb\nc");
    }

    #[tokio::test]
    async fn test_editor_null_text_is_empty() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("cleared.txt");
        std::fs::write(&file, "old").unwrap();
        let file_str = file.display().to_string();
        let state = test_state(&tmp, Config::default()).await;

        let (status, body) = send(
            http_router(state.clone()),
            post_json("/editor/replace", json!({"file": file_str, "text": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "");

        let (status, _) = send(
            http_router(state),
            post_json("/editor/insert", json!({"file": file_str, "text": null, "line": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_editor_content_errors() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, Config::default()).await;

        let (status, body) = send(http_router(state.clone()), get_req("/editor/content")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "file query param required");

        let missing = tmp.path().join("missing.txt");
        let (status, body) = send(
            http_router(state),
            get_req(&format!("/editor/content?path={}", missing.display())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "File not found");
    }

    #[tokio::test]
    async fn test_editor_requires_target() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, Config::default()).await;
        let (status, body) = send(
            http_router(state.clone()),
            post_json("/editor/insert", json!({"text": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "file or path required");

        let (status, body) = send(http_router(state), post_json("/editor/open", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "path required");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminal_run() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, Config::default()).await;

        let (status, body) = send(
            http_router(state.clone()),
            post_json("/terminal/run", json!({"command": "echo hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "output": "hi"}));

        let (status, body) = send(
            http_router(state.clone()),
            post_json("/terminal/run", json!({"command": "echo broken >&2; exit 1"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "broken");

        let (status, body) =
            send(http_router(state), post_json("/terminal/run", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "command required");
    }

    #[tokio::test]
    async fn test_auth_login_unconfigured() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, get_req("/auth/login")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["error"], "Azure credentials not configured in config.json");
    }

    #[tokio::test]
    async fn test_auth_login_redirects() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.azure.client_id = "client".to_string();
        config.azure.tenant_id = "tenant".to_string();
        let app = http_router(test_state(&tmp, config).await);

        let response = app.oneshot(get_req("/auth/login")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://login.microsoftonline.com/tenant/oauth2/v2.0/authorize?"));
    }

    #[tokio::test]
    async fn test_auth_callback_without_code() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, get_req("/auth/callback")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No code in callback");
    }

    #[tokio::test]
    async fn test_sharepoint_requires_auth() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, get_req("/sharepoint/files?siteId=root")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "Not authenticated with Microsoft. Call /auth/login first."
        );
    }

    #[tokio::test]
    async fn test_cors_header_present() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let request = Request::get("/ping")
            .header(header::ORIGIN, "https://claude.ai")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let tmp = TempDir::new().unwrap();
        let app = http_router(test_state(&tmp, Config::default()).await);
        let (status, body) = send(app, get_req("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }

    // ------------------------------------------------------------------
    // Socket transport
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_socket_handle_text() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, Config::default()).await;

        assert!(socket::handle_text(&state, "not json").await.is_none());

        let reply = socket::handle_text(
            &state,
            r#"{"id": 7, "type": "action.run", "action": "greet", "args": {"name": "ws"}}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply, json!({"id": 7, "ok": true, "result": "hello ws"}));

        let reply = socket::handle_text(&state, r#"{"id": "x", "type": "bogus"}"#)
            .await
            .unwrap();
        assert_eq!(reply, json!({"id": "x", "error": "Unknown type: bogus"}));

        let reply = socket::handle_text(&state, r#"{"type": "action.run", "action": "nope"}"#)
            .await
            .unwrap();
        assert!(reply.get("id").is_none());
        assert!(reply["error"]
            .as_str()
            .unwrap()
            .starts_with("Unknown action: nope"));

        let reply = socket::handle_text(&state, r#"{"id": 1, "type": "terminal.run"}"#)
            .await
            .unwrap();
        assert_eq!(reply, json!({"id": 1, "error": "command required"}));

        let reply = socket::handle_text(&state, r#"{"id": 2, "type": 5}"#)
            .await
            .unwrap();
        assert!(reply["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid message:"));
    }

    #[tokio::test]
    async fn test_socket_ignores_fields_the_type_does_not_read() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, Config::default()).await;

        let reply = socket::handle_text(
            &state,
            r#"{"id": 1, "type": "action.run", "action": "greet", "text": null}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply, json!({"id": 1, "ok": true, "result": "hello world"}));

        let reply = socket::handle_text(
            &state,
            r#"{"id": 2, "type": "action.run", "action": "greet", "line": -1}"#,
        )
        .await
        .unwrap();
        assert_eq!(reply, json!({"id": 2, "ok": true, "result": "hello world"}));

        // Fields the type does read are still checked.
        let reply = socket::handle_text(
            &state,
            r#"{"id": 3, "type": "action.run", "action": 42}"#,
        )
        .await
        .unwrap();
        assert!(reply["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid message:"));

        let reply = socket::handle_text(&state, r#"{"id": 4}"#).await.unwrap();
        assert_eq!(reply, json!({"id": 4, "error": "Unknown type: "}));
    }

    #[tokio::test]
    async fn test_socket_editor_messages() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, Config::default()).await;
        let file = tmp.path().join("ws.txt");
        let file_str = file.display().to_string();

        let missing = socket::handle_text(
            &state,
            &json!({"id": 1, "type": "editor.content", "file": file_str}).to_string(),
        )
        .await
        .unwrap();
        assert_eq!(missing["ok"], true);
        assert_eq!(missing["content"], Value::Null);

        let inserted = socket::handle_text(
            &state,
            &json!({"id": 2, "type": "editor.insert", "file": file_str, "text": "hi"}).to_string(),
        )
        .await
        .unwrap();
        assert_eq!(inserted, json!({"id": 2, "ok": true}));

        let read = socket::handle_text(
            &state,
            &json!({"id": 3, "type": "editor.content", "file": file_str}).to_string(),
        )
        .await
        .unwrap();
        assert_eq!(read["content"], "hi");
        assert_eq!(read["file"], file_str);
    }

    #[tokio::test]
    async fn test_socket_over_the_wire() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp, Config::default()).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, socket_router(state)).await.unwrap();
        });

        let (mut ws, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();

        let greeting = ws.next().await.unwrap().unwrap();
        let greeting: Value = serde_json::from_str(greeting.to_text().unwrap()).unwrap();
        assert_eq!(greeting, connected_event());

        ws.send(WsMessage::Text("garbage".into())).await.unwrap();
        ws.send(WsMessage::Text(
            json!({"id": "a", "type": "action.run", "action": "greet"}).to_string(),
        ))
        .await
        .unwrap();

        let reply = ws.next().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply, json!({"id": "a", "ok": true, "result": "hello world"}));

        ws.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.http_port = 0;
        config.ws_port = 0;
        let state = test_state(&tmp, config.clone()).await;

        let listeners = Listeners::bind(&config).await.unwrap();
        let http_addr = listeners.http_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(state, listeners, async move {
            let _ = rx.await;
        }));

        let stream = tokio::net::TcpStream::connect(http_addr).await;
        assert!(stream.is_ok());
        drop(stream);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
