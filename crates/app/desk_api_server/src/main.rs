//! Helpdesk auth API server binary.
//!
//! Reads configuration from the environment (and `.env`), runs migrations and
//! serves the REST API until interrupted.

use clap::Parser;
use desk_api::AppState;
use desk_api::config::ApiConfig;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "desk_api_server", about = "Helpdesk auth API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/desk"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Seed the default permission catalog and roles after migrating.
    #[arg(long, default_value_t = false)]
    seed: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,desk_api=debug,desk_core=debug")),
        )
        .init();

    let args = Args::parse();

    // Refuse to start without a usable signing secret.
    let mut config = ApiConfig::from_env().inspect_err(|e| {
        error!(error = %e, "invalid configuration");
    })?;
    config.bind_addr = args.bind;
    config.pg_connection_url = args.database_url;

    info!(bind = %config.bind_addr, max_connections = args.max_connections, "starting desk_api_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    desk_api::migrate(&pool).await?;

    if args.seed {
        let store = desk_core::store::postgres::PgStore::new(pool.clone());
        desk_core::rbac::seed::seed_rbac(&store).await?;
    }

    let state = AppState::postgres(pool, config.clone())?;
    let app = desk_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
