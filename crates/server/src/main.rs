// genpool API server
// Decision: The runtime is built by hand so stuck blocking work can be cut off with shutdown_timeout
// Decision: Shutdown order is HTTP first, then the worker pool, then the runtime

use std::sync::Arc;

use anyhow::{Context, Result};
use genpool_dispatch::{AdmissionGate, ArtifactStore, PatternLoader, TaskQueue, WorkerPool};
use genpool_server::{init_telemetry, router, AppState, ServiceConfig, TelemetryConfig};

fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "genpool_dispatch=info,genpool_server=info,tower_http=info")
    // - LOG_FORMAT: "text" or "json"
    let telemetry_config = TelemetryConfig::from_env();
    init_telemetry(&telemetry_config)?;

    if let Ok(path) = dotenv {
        tracing::info!("Loaded .env from {:?}", path);
    }

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;
    let forced_termination = config.forced_termination;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("genpool")
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(serve(config));

    // Blocking work that ignored the pool's deadline does not hold up exit.
    runtime.shutdown_timeout(forced_termination);
    tracing::info!("genpool-server stopped");
    result
}

async fn serve(config: ServiceConfig) -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "genpool-server starting...");

    let store = ArtifactStore::new(&config.output_dir);
    store
        .ensure_dir()
        .with_context(|| format!("Failed to create output directory {}", config.output_dir.display()))?;
    store
        .sweep_temporaries()
        .context("Failed to clean temporary files from the output directory")?;

    let queue = Arc::new(TaskQueue::new(config.queue_capacity));
    let gate = Arc::new(AdmissionGate::new(Arc::clone(&queue), config.limits.clone()));

    let loader = Arc::new(PatternLoader::new(config.device_count));
    let pool = Arc::new(
        WorkerPool::start(config.pool.clone(), loader, queue, store.clone())
            .context("Failed to start worker pool")?,
    );

    if config.cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS origins configured");
    }

    let state = AppState {
        gate,
        store,
        pool: Arc::clone(&pool),
        listing_page_size: config.listing_page_size,
    };
    let app = router(state, config.cors_origins.clone());

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_addr))?;
    tracing::info!(addr = %config.http_addr, "HTTP server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    tracing::info!("Server stopped accepting connections, stopping workers");
    let report = pool.shutdown(config.pool.shutdown_timeout).await;
    if report.forced > 0 || report.failed > 0 {
        tracing::warn!(
            forced = report.forced,
            failed = report.failed,
            "Some workers did not stop cleanly"
        );
    }
    if report.abandoned > 0 {
        tracing::error!(
            abandoned = report.abandoned,
            "Publications were still running at exit"
        );
    }

    served
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
