#![allow(missing_docs)]

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use product_harvest_lib::application::SearchService;
use product_harvest_lib::crawling::{PersistenceSink, PipelineSettings, SearchOrchestrator};
use product_harvest_lib::infrastructure::config::ServerConfig;
use product_harvest_lib::infrastructure::logging::init_logging_with_config;
use product_harvest_lib::infrastructure::{
    AppConfig, DatabaseConnection, MarketplaceClient, ProductRepository, ProductStore,
    ReqwestTransport,
};
use product_harvest_lib::{AppState, build_app};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging_with_config(&config.logging)?;
    info!(
        site = %config.marketplace.site_id,
        batch_size = config.pipeline.batch_size,
        fetch_concurrency = config.pipeline.fetch_concurrency,
        enrichment_concurrency = config.pipeline.enrichment_concurrency,
        "Starting product-harvest"
    );

    let store = open_store(&config).await;
    let sink = store
        .clone()
        .map(|store| PersistenceSink::new(store, config.pipeline.persist_chunk_size));

    let timeout = config.pipeline.request_timeout();
    let transport = ReqwestTransport::new(&config.marketplace, timeout)?;
    let client = MarketplaceClient::new(Arc::new(transport), &config.marketplace, timeout);
    let orchestrator = SearchOrchestrator::new(client, sink, PipelineSettings::from(&config.pipeline));

    let service = SearchService::new(Arc::new(orchestrator), store);
    let app = build_app(AppState::new(service));

    let listener = bind_with_fallback(&config.server).await?;
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

/// Searches keep working without a database; results are then only returned
async fn open_store(config: &AppConfig) -> Option<Arc<dyn ProductStore>> {
    let connection = match DatabaseConnection::connect_lazy(
        &config.database.url,
        config.database.max_connections,
    ) {
        Ok(connection) => connection,
        Err(e) => {
            error!(error = %e, url = %config.database.url, "Database configuration rejected");
            return None;
        }
    };

    if let Err(e) = connection.migrate().await {
        warn!(error = %e, url = %config.database.url, "Database unavailable, persistence disabled");
        return None;
    }

    info!(url = %config.database.url, "Database ready");
    Some(Arc::new(ProductRepository::new(connection.pool().clone())))
}

async fn bind_with_fallback(server: &ServerConfig) -> Result<TcpListener> {
    for attempt in 0..server.port_search_attempts {
        let Some(port) = server.port.checked_add(attempt) else {
            break;
        };
        match TcpListener::bind((server.host.as_str(), port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => warn!(port, error = %e, "Port unavailable, trying the next one"),
        }
    }
    bail!(
        "No free port in {}..{} on {}",
        server.port,
        server.port.saturating_add(server.port_search_attempts),
        server.host
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
