use std::sync::Arc;

use apiary::api::service::Service;
use apiary::config::AppConfig;
use apiary::seed;
use apiary::store::couch::CouchStore;
use axum::serve;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Default to Info, quiet the HTTP client internals
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .init();

    let config = AppConfig::load()?;
    log::info!(
        "configuration loaded: server={}:{}",
        config.server.host,
        config.server.port
    );

    let store = Arc::new(CouchStore::new(&config.database_url()));

    // Induce any configured sample files into the persisted spec first;
    // the service is immutable once constructed.
    seed::load_samples(&*store, &config).await?;

    let service = Service::bootstrap(store, &config).await?;
    log::info!(
        "mounted {} route templates under {}",
        service.spec().paths.len(),
        service.spec().base_path
    );

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    serve(listener, service.router()).await?;

    Ok(())
}
