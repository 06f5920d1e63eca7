use network_centrality::server;
use network_centrality::{CentralityService, Config};
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("network_centrality=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    info!("Starting Network Centrality Service");

    let config = Config::from_env()?;
    info!(
        "Limits: {} nodes / {} edges per request, {} / {} per batch",
        config.max_nodes, config.max_edges, config.batch_max_nodes, config.batch_max_edges
    );
    match &config.task_store_dir {
        Some(dir) => info!("Task records persisted under {}", dir.display()),
        None => info!("Task records kept in memory"),
    }

    let bind_addr = config.bind_addr.clone();
    let service = match CentralityService::start(config).await {
        Ok(service) => {
            info!("✅ Centrality service initialised");
            service
        }
        Err(e) => {
            error!("❌ Service initialisation failed: {}", e);
            return Err(e);
        }
    };

    let app = server::create_router(server::AppState::new(service.clone()));

    info!("🚀 Server starting on {}", bind_addr);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!("✅ TCP listener bound successfully");
            listener
        }
        Err(e) => {
            error!("❌ Failed to bind TCP listener: {}", e);
            return Err(anyhow::anyhow!("Failed to bind TCP listener: {}", e));
        }
    };

    info!("🌐 Starting HTTP server...");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    service.shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // no signal source: serve until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
