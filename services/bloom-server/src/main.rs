//! Bloom Server
//!
//! Runs the Bloom auth API: password and Telegram sign-in, token refresh,
//! logout and the operator endpoints, backed by PostgreSQL and Redis.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! bloom-server
//!
//! # Start with custom config
//! bloom-server --config /path/to/config.toml
//!
//! # Start with environment overrides
//! BLOOM__SERVER__PORT=8080 bloom-server
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bloom_api::{create_router, ApiConfig, AppState};
use bloom_auth::{AuthService, LogNotifier, Notifier, TelegramNotifier};
use bloom_db::Database;

use crate::config::ServerConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Bloom Server - authentication API for the flower-subscription service
#[derive(Parser, Debug)]
#[command(name = "bloom-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "BLOOM_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "BLOOM_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "BLOOM_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BLOOM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "BLOOM_LOG_FORMAT")]
    log_format: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// JWT signing secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_bot_token: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(url) = self.database_url {
            config.database.postgres_url = url;
        }
        if let Some(url) = self.redis_url {
            config.database.redis_url = url;
        }
        if let Some(secret) = self.jwt_secret {
            config.auth.jwt.secret = secret;
        }
        if let Some(token) = self.telegram_bot_token {
            config.auth.telegram.bot_token = Some(token);
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut server_config);

    init_logging(&server_config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Bloom server");

    if let Err(errors) = server_config.auth.validate() {
        for error in &errors {
            tracing::error!(error = %error, "Invalid auth configuration");
        }
        anyhow::bail!("auth configuration is invalid ({} problems)", errors.len());
    }

    let db = init_database(&server_config).await?;
    let auth = init_auth(&server_config, &db)?;

    let state = Arc::new(AppState::new(auth, Some(db)));
    let app = create_router(state, ApiConfig::from(&server_config.api));

    let addr = server_config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }
}

/// Connect to PostgreSQL and Redis, then bring the schema up to date
async fn init_database(config: &ServerConfig) -> anyhow::Result<Arc<Database>> {
    tracing::info!(
        postgres = %config.database.postgres_url_masked(),
        redis = %config.database.redis_url_masked(),
        "Connecting to database..."
    );

    let db = Database::connect(&config.database).await?;

    if config.server.run_migrations {
        db.migrate().await?;
    }

    let health = db.health_check().await;
    if !health.postgres {
        anyhow::bail!("PostgreSQL health check failed");
    }
    if !health.redis {
        // Auth keeps serving with Redis down: reads fail open, revocations fail closed.
        tracing::warn!("Redis is unreachable at startup");
    }

    tracing::info!(
        postgres = health.postgres,
        redis = health.redis,
        "Database health check passed"
    );

    Ok(Arc::new(db))
}

/// Build the auth core on top of the database handles
fn init_auth(config: &ServerConfig, db: &Database) -> anyhow::Result<Arc<AuthService>> {
    let telegram = &config.auth.telegram;
    let notifier: Arc<dyn Notifier> = match (&telegram.bot_token, telegram.send_welcome) {
        (Some(token), true) => Arc::new(TelegramNotifier::new(&telegram.api_base_url, token)?),
        _ => Arc::new(LogNotifier),
    };

    let auth = AuthService::new(
        config.auth.clone(),
        db.user_repo(),
        db.kv_store(),
        notifier,
    )?;

    tracing::info!(
        telegram = telegram.bot_token.is_some(),
        rate_limiting = config.auth.rate_limit.enabled,
        trust_forwarded_headers = config.auth.rate_limit.trust_forwarded_headers,
        "Authentication service initialized"
    );

    Ok(Arc::new(auth))
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
