use anyhow::Result;
use common::database::{DatabaseConfig, init_pool};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scoreboard_api::{
    AppState,
    config::{ApiConfig, StorageKind},
    jobs, routes,
    middleware::JwtConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting scoreboard API service");

    let config = ApiConfig::load()?;
    let jwt = JwtConfig::from_env()
        .map_err(anyhow::Error::msg)?
        .verifier()?;

    let app_state = match config.storage {
        StorageKind::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            // Check database connectivity
            if common::database::health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            access::store::postgres::migrate(&pool).await?;
            AppState::postgres(&config, pool, jwt)
        }
        StorageKind::Memory => {
            warn!("Using in-memory storage; codes and payments are lost on restart");
            AppState::in_memory(&config, jwt)
        }
    };

    let _sweeper = match config.expiry_sweep_schedule() {
        Some(schedule) => Some(jobs::start_expiry_sweep(app_state.codes().clone(), schedule).await?),
        None => {
            info!("Expiry sweep disabled");
            None
        }
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("API service listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
