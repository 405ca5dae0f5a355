use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use visitor_counter::api::{self, cache::StatsCache, handler::CounterState};
use visitor_counter::config::{AppConfig, StorageBackend};
use visitor_counter::counter::VisitCounter;
use visitor_counter::storage::{self, memory::MemoryStore, sqlite::SqliteStore, VisitorStore};

#[derive(Parser)]
#[command(name = "visitor-counter", about = "Deduplicating visitor counter service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visitor_counter=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        backend = config.storage.backend.as_str(),
        "starting visitor-counter"
    );

    let store: Arc<dyn VisitorStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            let pool = storage::sqlite::create_pool(&config.storage)?;
            storage::sqlite::init_pool(&pool).await?;
            tracing::info!(db = %config.storage.path.display(), "database initialized");
            Arc::new(SqliteStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("memory backend selected, counts reset on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(CounterState {
        counter: VisitCounter::new(store),
        stats_cache: StatsCache::new(config.stats.cache_ttl_secs),
        recent_window_hours: config.counter.recent_window_hours,
        trust_proxy_headers: config.server.trust_proxy_headers,
    });

    // ── Counter route (public, optionally rate-limited) ──
    let mut counter_routes = api::counter_routes(state.clone());
    if config.rate_limit.enabled {
        counter_routes = api::rate_limited(
            counter_routes,
            &config.rate_limit,
            config.server.trust_proxy_headers,
        )?;
        tracing::info!(
            per_second = config.rate_limit.per_second,
            burst_size = config.rate_limit.burst_size,
            keyed_on_proxy_headers = config.server.trust_proxy_headers,
            "rate limiting enabled"
        );
    }

    let app = counter_routes
        .merge(api::read_routes(state))
        .layer(api::cors_layer(&config.cors))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
}
