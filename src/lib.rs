pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

pub use api::*;
pub use model::*;

use std::sync::Arc;

/// Boots the full service against the configured document store: load the
/// persisted spec (inducing any configured samples first), rebuild routes,
/// and serve.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init();

    let config = crate::config::AppConfig::load()?;

    let store = Arc::new(crate::store::couch::CouchStore::new(&config.database_url()));

    crate::seed::load_samples(&*store, &config).await?;

    let service = crate::api::service::Service::bootstrap(store, &config).await?;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("serving generated API on {}", bind_address);

    serve(listener, service.router()).await?;

    Ok(())
}
