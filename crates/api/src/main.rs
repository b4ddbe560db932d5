use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hoit_compute::progress::{NoopProgressCache, ProgressCache, RedisProgressCache};
use hoit_compute::transport::{ReqwestTransport, WorkerTransport};
use hoit_db::store::PgStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hoit_api::config::{PipelineConfig, ServerConfig};
use hoit_api::router::build_app_router;
use hoit_api::state::{AppState, Transports};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    // LOG_FORMAT=json switches to one JSON object per line.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hoit_api=debug,hoit_pipeline=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let pipeline = PipelineConfig::from_env().expect("Invalid pipeline configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        ml_server = %pipeline.ml_server_url,
        gpu_server = %pipeline.gpu_server_url,
        callback_url = %pipeline.render_callback_url,
        workers = pipeline.dispatch_workers,
        signed_callbacks = pipeline.webhook_secret.is_some(),
        "Loaded pipeline configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = hoit_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    hoit_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    hoit_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Worker transport ---
    let transport: Arc<dyn WorkerTransport> =
        Arc::new(ReqwestTransport::new().expect("Failed to build HTTP client"));

    // --- Progress cache ---
    let progress: Arc<dyn ProgressCache> = match pipeline.redis_url.as_deref() {
        Some(url) => match RedisProgressCache::new(url) {
            Ok(cache) => {
                tracing::info!("Live render progress enabled");
                Arc::new(cache)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid REDIS_URL, live render progress disabled");
                Arc::new(NoopProgressCache)
            }
        },
        None => Arc::new(NoopProgressCache),
    };

    // --- App state ---
    let (state, workers) = AppState::build(
        Arc::new(PgStore::new(pool)),
        progress,
        Transports {
            ml: Arc::clone(&transport),
            gpu: transport,
        },
        pipeline,
    );
    tracing::info!("Dispatch workers started");

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining dispatch queue");

    let drained = workers
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if drained {
        tracing::info!("Dispatch workers stopped");
    } else {
        tracing::warn!("Dispatch workers did not drain in time, aborted");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
