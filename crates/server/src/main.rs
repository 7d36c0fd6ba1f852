use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelpress_core::{
    load_config, validate_config, Config, Encoder, EventBus, FfmpegEncoder, OutcomeNotifier,
    QueueBackend, SqliteJobQueue, WebhookNotifier, WorkerPool,
};
use reelpress_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("REELPRESS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration; logging format depends on it
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config);
    info!(version = VERSION, "Starting reelpress");
    info!("Configuration loaded from {:?}", config_path);

    validate_config(&config).context("Configuration validation failed")?;

    info!("Database path: {:?}", config.database.path);
    info!("Worker concurrency: {}", config.worker.concurrency);

    // Durable queue
    let queue: Arc<dyn QueueBackend> = Arc::new(
        SqliteJobQueue::new(&config.database.path, config.queue.clone())
            .context("Failed to open job queue")?
            .with_retry(config.retry.clone()),
    );
    info!("Job queue initialized");

    // Encoding engine
    let encoder: Arc<dyn Encoder> = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
    encoder
        .validate()
        .await
        .context("Encoding engine is not available")?;
    info!("Using encoder: {}", encoder.name());

    let events = EventBus::default();

    // Optional outcome webhook
    let notifier: Option<Arc<dyn OutcomeNotifier>> =
        match WebhookNotifier::from_config(&config.notifier)
            .context("Failed to create webhook notifier")?
        {
            Some(notifier) => {
                info!("Outcome webhook enabled");
                Some(Arc::new(notifier))
            }
            None => {
                info!("No outcome webhook configured");
                None
            }
        };

    let mut pool = WorkerPool::new(config.worker.clone(), Arc::clone(&queue), encoder)
        .with_retry(config.retry.clone())
        .with_lease_duration(config.queue.visibility_timeout())
        .with_events(events.clone());
    if let Some(notifier) = notifier {
        pool = pool.with_notifier(notifier);
    }
    let pool = Arc::new(pool);

    pool.start(config.worker.concurrency)
        .await
        .context("Failed to start worker pool")?;
    info!("Worker pool started");

    let state = Arc::new(AppState::new(
        config.clone(),
        queue,
        Arc::clone(&pool),
        events,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped, draining worker pool...");
    let report = pool.shutdown(config.worker.shutdown_timeout()).await;
    if report.aborted > 0 {
        warn!(
            stopped = report.stopped,
            aborted = report.aborted,
            "Shutdown deadline reached; aborted jobs will be redelivered"
        );
    } else {
        info!(stopped = report.stopped, "Worker pool stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
