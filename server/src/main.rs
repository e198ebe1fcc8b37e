//! Table orders HTTP server.
//!
//! Wires the Postgres ledger, the Redis coordination cache and the HTTP API
//! together and serves until Ctrl+C or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d postgres redis
//!
//! # Run server
//! cargo run --bin table-orders-server
//! ```

mod config;

use anyhow::Context;
use config::Config;
use sqlx::postgres::PgPoolOptions;
use table_orders_postgres::PostgresLedgerStore;
use table_orders_redis::RedisCoordinationCache;
use table_orders_runtime::{BackoffPolicy, IdempotencyCoordinator, MetricsServer, OrderService};
use table_orders_web::{AppState, build_router};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,table_orders=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting table orders server");

    let config = Config::from_env();
    info!(
        redis = %config.redis.url,
        bind = %config.bind_address(),
        idempotency_ttl_seconds = config.orders.idempotency_ttl_seconds,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(
        config
            .metrics_address()
            .parse()
            .context("Invalid METRICS_HOST/METRICS_PORT")?,
    );
    metrics.start()?;

    info!("Connecting to order database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(config.postgres.connect_timeout())
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to Postgres")?;
    let ledger = PostgresLedgerStore::new(pool);
    ledger.migrate().await?;
    info!("Order database ready");

    info!("Connecting to Redis...");
    let cache = RedisCoordinationCache::new(&config.redis.url).await?;
    info!("Redis connected");

    let poll = BackoffPolicy::builder()
        .budget(config.orders.idempotency_poll_budget())
        .build();
    let coordinator =
        IdempotencyCoordinator::with_policy(cache, config.orders.idempotency_ttl(), poll)?;
    let service = OrderService::new(ledger, coordinator);

    let app = build_router(AppState::new(service, config.orders.default_preparation()));

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    info!(addr = %config.bind_address(), "HTTP server listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    let shutdown_timeout = config.server.shutdown_timeout();
    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(Ok(Ok(()))) => info!("Server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "Server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "Server task failed"),
        Err(_) => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Graceful shutdown timed out, dropping in-flight requests"
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
