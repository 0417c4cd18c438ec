use std::sync::Arc;

use dotenvy::dotenv;
use log::{error, info};

use crmserver::core::config::{AppConfig, StoreBackend};
use crmserver::core::shared::state::AppState;
use crmserver::core::shared::utils::{create_conn, run_migrations};
use crmserver::crm::store::{JourneyStore, MemoryStore, PgStore};
use crmserver::main_module::run_axum_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    info!(
        "Starting crmserver {} ({:?} store)",
        env!("CARGO_PKG_VERSION"),
        config.crm.store
    );

    let (store, conn) = match config.crm.store {
        StoreBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
            let pool = create_conn(url, config.database.pool_size).map_err(|e| {
                error!("Failed to create database pool: {e}");
                e
            })?;
            run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
            let store: Arc<dyn JourneyStore> = Arc::new(PgStore::new(pool.clone()));
            (store, Some(pool))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; data is lost on shutdown");
            let store: Arc<dyn JourneyStore> = Arc::new(MemoryStore::new());
            (store, None)
        }
    };

    let state = Arc::new(AppState::new(config, store, conn)?);
    run_axum_server(state).await?;
    info!("crmserver stopped");
    Ok(())
}
