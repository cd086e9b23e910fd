use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hivegate::config::HivegateConfig;
use hivegate::store::{CounterStore, MemoryStore};
use hivegate::Gate;

/// Demo HTTP server with the rate limit gate in front of every route.
#[derive(Debug, Parser)]
#[command(name = "hivegate", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hivegate=info"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Hivegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = HivegateConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(
        listen_addr = %config.server.listen_addr,
        algorithm = %config.gate.algorithm,
        max = config.gate.max,
        burst = config.gate.burst,
        period_ms = config.gate.period_ms,
        "Configuration loaded"
    );

    let store = build_store(&config).await?;
    let gate = Gate::builder(config.gate.clone()).store(store).build()?;
    info!("Gate initialized");

    let app = Router::new()
        .route("/", get(|| async { "Welcome!" }))
        .layer(gate.layer());

    let listener = TcpListener::bind(config.server.listen_addr).await?;
    info!("Listening on {}", config.server.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Hivegate stopped");
    Ok(())
}

async fn build_store(config: &HivegateConfig) -> anyhow::Result<Arc<dyn CounterStore>> {
    if let Some(url) = &config.server.redis_url {
        #[cfg(feature = "redis")]
        {
            let store = hivegate::store::RedisStore::connect(url).await?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "redis"))]
        warn!(
            url = %hivegate::store::redacted_url(url),
            "Built without the redis feature, using the in-memory store"
        );
    }

    let store = Arc::new(MemoryStore::new());
    let sweeper = store.clone();
    let interval = Duration::from_secs(config.server.purge_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweeper.purge_expired();
        }
    });
    info!("Using in-memory counter store");
    Ok(store)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
