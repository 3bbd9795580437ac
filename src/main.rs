use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agent_bridge::actions::{builtins_plugin, load_plugins, ActionRegistry};
use agent_bridge::auth::{AuthState, MicrosoftAuth, TokenStore};
use agent_bridge::config::Config;
use agent_bridge::graph::GraphClient;
use agent_bridge::server::{self, AppState, Listeners};

#[derive(Parser)]
#[command(name = "agent-bridge")]
#[command(about = "Local bridge exposing host actions, files and SharePoint", long_about = None)]
struct Cli {
    /// Path to config.json (overrides AGENT_BRIDGE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and socket servers (default)
    Serve,
    /// List registered actions and their owning plugins
    Actions,
    /// Manage Microsoft authentication
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum AuthAction {
    /// Print the Microsoft login URL
    Login,
    /// Forget the stored token
    Logout,
    /// Show whether a token is stored
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Some(Commands::Version) = cli.command {
        println!("agent-bridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let (config, source) =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config);
    if let Some(notice) = source.notice() {
        warn!("{}", notice);
    }

    match cli.command {
        Some(Commands::Serve) | None => serve(config).await,
        Some(Commands::Actions) => list_actions(&config).await,
        Some(Commands::Auth { action }) => auth(&config, action).await,
        Some(Commands::Version) => Ok(()),
    }
}

/// `RUST_LOG` wins; otherwise the config's `logLevel` applies.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_registry(config: &Config) -> ActionRegistry {
    let registry = ActionRegistry::new().with_timeout(config.action_timeout());
    registry.register(builtins_plugin()).await;
    for plugin in load_plugins(Path::new(&config.plugins_dir)) {
        registry.register(plugin).await;
    }
    registry
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let registry = Arc::new(build_registry(&config).await);
    let auth_state = Arc::new(AuthState::load(TokenStore::new(&config.token_store_path)));
    let auth = MicrosoftAuth::new(&config, auth_state.clone());
    let graph = GraphClient::new(auth_state.clone());

    let listeners = Listeners::bind(&config).await.with_context(|| {
        format!(
            "Failed to bind {}:{} / {}:{}",
            config.host, config.http_port, config.host, config.ws_port
        )
    })?;

    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    info!(
        http = %format!("http://{}:{}", config.host, config.http_port),
        socket = %format!("ws://{}:{}", config.host, config.ws_port),
        cwd = %cwd,
        actions = registry.len().await,
        authenticated = auth_state.is_authenticated().await,
        "Agent Bridge running"
    );
    if !auth.is_configured() {
        warn!("SharePoint disabled: set azure.clientId and azure.tenantId in config.json");
    } else if !auth_state.is_authenticated().await {
        info!(
            "Sign in to Microsoft at http://{}:{}/auth/login",
            config.host, config.http_port
        );
    }

    let state = AppState {
        config: Arc::new(config),
        registry,
        auth,
        graph,
    };
    server::serve(state, listeners, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}

async fn list_actions(config: &Config) -> anyhow::Result<()> {
    let registry = build_registry(config).await;
    for name in registry.list().await {
        let owner = registry.owner(&name).await.unwrap_or_default();
        let description = registry
            .describe(&name)
            .await
            .and_then(|action| action.description().map(str::to_string))
            .unwrap_or_default();
        println!("{:<24} {:<16} {}", name, owner, description);
    }
    Ok(())
}

async fn auth(config: &Config, action: AuthAction) -> anyhow::Result<()> {
    let state = Arc::new(AuthState::load(TokenStore::new(&config.token_store_path)));
    let auth = MicrosoftAuth::new(config, state.clone());

    match action {
        AuthAction::Login => {
            if !auth.is_configured() {
                anyhow::bail!("Azure credentials not configured in config.json");
            }
            println!("Start the bridge, then open this URL to sign in:");
            println!("{}", auth.login_url()?);
        }
        AuthAction::Logout => {
            state.clear().await?;
            println!("Microsoft token removed");
        }
        AuthAction::Status => match state.token().await {
            Some(token) if token.is_expired() => println!("Token stored but expired"),
            Some(_) => println!("Authenticated with Microsoft"),
            None => println!("Not authenticated"),
        },
    }
    Ok(())
}
