//! Standalone purchase service binary

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use estate::{database::mask_url, EstateServiceRunner, ServiceConfig};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[clap(name = "estate-service")]
#[clap(about = "ChipEstate purchase service - chip assignment, badges and holder votes")]
struct Args {
    /// Database connection URL (can also be set via ESTATE_DATABASE_URL env var)
    #[clap(long, env = "ESTATE_DATABASE_URL")]
    database_url: String,

    /// Listen address for the HTTP server
    #[clap(long, default_value = "0.0.0.0:8080", env = "ESTATE_LISTEN_ADDR")]
    listen_addr: SocketAddr,

    /// Hex-encoded Ed25519 public key of the session token issuer
    #[clap(long, env = "ESTATE_AUTH_PUBLIC_KEY")]
    auth_public_key: String,

    #[clap(long, default_value_t = 50, env = "ESTATE_MAX_CONNECTIONS")]
    max_connections: u32,

    /// Log every SQL statement
    #[clap(long, env = "ESTATE_SQL_LOGGING")]
    sql_logging: bool,

    /// Upper bound on chips bought in one checkout
    #[clap(long, default_value_t = 1000, env = "ESTATE_MAX_CHIPS_PER_PURCHASE")]
    max_chips_per_purchase: u32,

    /// Attempts made when selected chips are claimed concurrently
    #[clap(long, default_value_t = 3, env = "ESTATE_CLAIM_RETRIES")]
    claim_retries: u32,

    /// Create missing tables and seed the badge catalog on start-up
    #[clap(long, env = "ESTATE_BOOTSTRAP_SCHEMA")]
    bootstrap_schema: bool,

    /// Log level used when RUST_LOG is not set
    #[clap(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenv().ok();

    let args = Args::parse();

    let _log_guard = monitoring::init_logging(&format!(
        "estate={0},estate_service={0},monitoring={0},sea_orm=warn",
        args.log_level
    ))?;

    tracing::info!("Starting ChipEstate purchase service");
    tracing::info!("Database URL: {}", mask_url(&args.database_url));
    tracing::info!("Listen address: {}", args.listen_addr);

    let config = ServiceConfig {
        database_url: args.database_url,
        listen_addr: args.listen_addr,
        auth_public_key: args.auth_public_key,
        max_connections: args.max_connections,
        enable_sql_logging: args.sql_logging,
        max_chips_per_purchase: args.max_chips_per_purchase,
        claim_retries: args.claim_retries,
        bootstrap_schema: args.bootstrap_schema,
        ..Default::default()
    };

    let service = EstateServiceRunner::new(config).await?;

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => {
                tracing::error!("Failed to install CTRL+C signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = service.run() => {
            if let Err(e) = result {
                tracing::error!("Service error: {}", e);
                std::process::exit(1);
            }
        }
        _ = shutdown => {
            tracing::info!("Shutting down gracefully");
        }
    }

    tracing::info!("Purchase service stopped");
    Ok(())
}
