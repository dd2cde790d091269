//! Service runner: wires configuration, database and the HTTP router

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    auth::TokenVerifier,
    badges,
    config::{PurchaseLimits, ServiceConfig},
    database::{Database, DatabaseSettings},
    purchase::PurchaseService,
    routes::{self, AppState},
};

/// Main purchase service
pub struct EstateServiceRunner {
    config: ServiceConfig,
    state: Arc<AppState>,
}

impl EstateServiceRunner {
    /// Create a new purchase service
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let verifier = TokenVerifier::from_public_key_hex(&config.auth_public_key)?;

        let db = Database::connect(&DatabaseSettings::from(&config)).await?;
        if config.bootstrap_schema {
            db.ensure_schema().await?;
            badges::ensure_default_catalog(db.connection()).await?;
            info!("Badge catalog seeded");
        }

        monitoring::init_metrics();

        let purchases = PurchaseService::new(db.clone(), PurchaseLimits::from(&config));
        let state = Arc::new(AppState {
            db,
            purchases,
            verifier,
        });

        Ok(Self { config, state })
    }

    /// Run the HTTP server
    pub async fn run(self) -> Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;

        info!("Starting purchase service on {}", addr);

        axum::serve(listener, routes::router(self.state))
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
