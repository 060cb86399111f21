//! Edugate API server binary.
//!
//! Connects to PostgreSQL, runs migrations and serves the HTTP API until
//! Ctrl-C or SIGTERM.

use clap::Parser;
use edugate_api::config::ApiConfig;
use edugate_core::auth::sso::SsoRegistry;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments. Anything omitted falls back to the environment.
#[derive(Parser, Debug)]
#[command(name = "edugate_api_server", about = "Edugate API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/edugate"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Access-token lifetime (`<n>s|m|h|d`).
    #[arg(long, env = "JWT_EXPIRES_IN", default_value = "15m")]
    access_duration: String,

    /// Refresh-token lifetime (`<n>s|m|h|d`).
    #[arg(long, env = "JWT_REFRESH_EXPIRES_IN", default_value = "7d")]
    refresh_duration: String,

    /// Mark auth cookies `Secure`.
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false)]
    secure_cookies: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,edugate_api=debug,edugate_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    // Secrets and bcrypt cost come from the environment only.
    let config = ApiConfig {
        bind_addr: args.bind_addr,
        database_url: args.database_url,
        access_duration: args.access_duration,
        refresh_duration: args.refresh_duration,
        secure_cookies: args.secure_cookies,
        ..ApiConfig::from_env()
    };
    info!(?config, "starting edugate_api_server");
    if !config.secure_cookies {
        warn!("auth cookies are not marked Secure");
    }

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    info!("running database migrations");
    edugate_api::migrate(&pool).await?;

    // No SSO providers are compiled in; the routes answer 404 until one is
    // registered here.
    let sso = SsoRegistry::new();

    let bind_addr = config.bind_addr.clone();
    let state = edugate_api::AppState::postgres(pool, config, sso)?;
    let app = edugate_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
