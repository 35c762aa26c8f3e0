//! # stockchat
//!
//! Binary entry point: `serve` runs the REST persistence server, `chat`
//! opens an interactive session against the inference backend, `token`
//! issues a session token.

#![deny(unsafe_code)]

mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stockchat_client::{
    ConnectionManager, Correlator, FileStorage, HttpGateway, SessionConfig, SessionController,
};
use stockchat_core::protocol::ws_url;
use stockchat_core::{AuthGateway, PersistenceGateway};
use stockchat_server::{SHUTDOWN_TIMEOUT, ServerConfig, StockchatServer};
use stockchat_settings::{StockchatSettings, get_settings, resolve_path};
use stockchat_store::{ChatStore, SqliteAuthGateway, SqliteGateway};
use tracing::info;

/// Realtime stock chat.
#[derive(Parser, Debug)]
#[command(name = "stockchat", about = "Realtime stock chat client and server")]
struct Cli {
    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST persistence server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// Path to the `SQLite` database.
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Reject requests without a bearer token.
        #[arg(long)]
        require_auth: bool,
    },
    /// Chat with the inference backend in the terminal.
    Chat {
        /// Inference backend endpoint (http, https, ws or wss).
        #[arg(long)]
        endpoint: Option<String>,
        /// Persist through a REST server at this URL.
        #[arg(long, conflicts_with = "db_path")]
        api_url: Option<String>,
        /// Bearer token for the REST server.
        #[arg(long, requires = "api_url")]
        token: Option<String>,
        /// Persist directly into this `SQLite` database.
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// User to chat as.
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Issue a session token for a user.
    Token {
        /// User the token authenticates.
        #[arg(long)]
        user_id: Option<i64>,
        /// Path to the `SQLite` database.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_store(db_path: Option<PathBuf>, settings: &StockchatSettings) -> Result<Arc<ChatStore>> {
    let path = db_path.unwrap_or_else(|| resolve_path(&settings.server.db_path));
    ensure_parent_dir(&path)?;
    let store = ChatStore::open_file(&path)
        .with_context(|| format!("failed to open database: {}", path.display()))?;
    info!(path = %path.display(), "database opened");
    Ok(Arc::new(store))
}

async fn serve(
    settings: &StockchatSettings,
    host: Option<String>,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    require_auth: bool,
) -> Result<()> {
    let store = open_store(db_path, settings)?;
    let mut config = ServerConfig::from_settings(settings);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.require_auth |= require_auth;

    let server = StockchatServer::new(
        config,
        Arc::new(SqliteGateway::new(Arc::clone(&store))),
        Arc::new(SqliteAuthGateway::new(store)),
    );
    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    println!("stockchat server listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    server.shutdown(handle, SHUTDOWN_TIMEOUT).await;
    Ok(())
}

async fn chat(
    settings: &StockchatSettings,
    endpoint: Option<String>,
    api_url: Option<String>,
    token: Option<String>,
    db_path: Option<PathBuf>,
    user_id: Option<i64>,
) -> Result<()> {
    let api_url = api_url.or_else(|| {
        db_path
            .is_none()
            .then(|| settings.client.api_url.clone())
            .flatten()
    });
    let gateway: Arc<dyn PersistenceGateway> = match api_url {
        Some(url) => {
            let mut gateway = HttpGateway::new(url);
            if let Some(token) = token.or_else(|| settings.client.api_token.clone()) {
                gateway = gateway.with_token(token);
            }
            Arc::new(gateway)
        }
        None => Arc::new(SqliteGateway::new(open_store(db_path, settings)?)),
    };

    let state_file = resolve_path(&settings.session.state_file);
    ensure_parent_dir(&state_file)?;
    let storage = Arc::new(FileStorage::open(state_file));

    let endpoint = endpoint.unwrap_or_else(|| settings.backend.llm_endpoint.clone());
    let connection = Arc::new(ConnectionManager::new(
        ws_url(&endpoint),
        settings.backend.reconnect_delay(),
    ));
    let correlator = Correlator::new(Arc::clone(&connection), settings.backend.request_timeout());

    let mut config = SessionConfig::from_settings(&settings.session);
    if let Some(user_id) = user_id {
        config.user_id = user_id;
    }
    let controller = Arc::new(SessionController::new(
        gateway,
        storage,
        Arc::new(correlator),
        config,
    ));

    let result = repl::run(controller, connection.watch_state()).await;
    connection.shutdown().await;
    result
}

async fn issue_token(
    settings: &StockchatSettings,
    user_id: Option<i64>,
    db_path: Option<PathBuf>,
) -> Result<()> {
    let auth = SqliteAuthGateway::new(open_store(db_path, settings)?);
    let user_id = user_id.unwrap_or(settings.session.user_id);
    let token = auth
        .issue(user_id)
        .await
        .context("failed to issue session token")?;
    println!("{token}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = get_settings();
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    stockchat_core::logging::init_subscriber(level);

    match cli.command {
        Command::Serve {
            host,
            port,
            db_path,
            require_auth,
        } => serve(settings, host, port, db_path, require_auth).await,
        Command::Chat {
            endpoint,
            api_url,
            token,
            db_path,
            user_id,
        } => chat(settings, endpoint, api_url, token, db_path, user_id).await,
        Command::Token { user_id, db_path } => issue_token(settings, user_id, db_path).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_come_from_settings() {
        let cli = Cli::parse_from(["stockchat", "serve"]);
        assert!(cli.log_level.is_none());
        match cli.command {
            Command::Serve {
                host,
                port,
                db_path,
                require_auth,
            } => {
                assert_eq!(host, None);
                assert_eq!(port, None);
                assert_eq!(db_path, None);
                assert!(!require_auth);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn serve_overrides() {
        let cli = Cli::parse_from([
            "stockchat",
            "serve",
            "--port",
            "8080",
            "--db-path",
            "/tmp/chat.db",
            "--require-auth",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Serve {
                port,
                db_path,
                require_auth,
                ..
            } => {
                assert_eq!(port, Some(8080));
                assert_eq!(db_path, Some(PathBuf::from("/tmp/chat.db")));
                assert!(require_auth);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn chat_with_rest_gateway() {
        let cli = Cli::parse_from([
            "stockchat",
            "chat",
            "--endpoint",
            "https://llm.example.com",
            "--api-url",
            "http://127.0.0.1:3000",
            "--token",
            "abc",
        ]);
        match cli.command {
            Command::Chat {
                endpoint,
                api_url,
                token,
                ..
            } => {
                assert_eq!(endpoint.as_deref(), Some("https://llm.example.com"));
                assert_eq!(api_url.as_deref(), Some("http://127.0.0.1:3000"));
                assert_eq!(token.as_deref(), Some("abc"));
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn chat_rejects_two_gateways() {
        let result = Cli::try_parse_from([
            "stockchat",
            "chat",
            "--api-url",
            "http://127.0.0.1:3000",
            "--db-path",
            "/tmp/chat.db",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn token_requires_api_url() {
        assert!(Cli::try_parse_from(["stockchat", "chat", "--token", "abc"]).is_err());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["stockchat"]).is_err());
    }

    #[test]
    fn ensure_parent_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("chat.db");
        ensure_parent_dir(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        ensure_parent_dir(Path::new("chat.db")).unwrap();
    }

    #[tokio::test]
    async fn token_is_valid_against_the_same_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let settings = StockchatSettings::default();

        let store = open_store(Some(path.clone()), &settings).unwrap();
        let auth = SqliteAuthGateway::new(store);
        let issued = auth.issue(7).await.unwrap();

        let reopened = SqliteAuthGateway::new(open_store(Some(path), &settings).unwrap());
        assert_eq!(reopened.validate(&issued).await.unwrap(), Some(7));
    }
}
