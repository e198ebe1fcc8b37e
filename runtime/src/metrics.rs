//! Prometheus metrics for the order ledger and idempotency claims.
//!
//! Counter names are shared by the emitting code and by
//! [`register_metrics`], which attaches their descriptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use table_orders_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Claim attempts, labelled `outcome` = `won` | `conflict`.
pub const IDEMPOTENCY_CLAIMS: &str = "idempotency.claims";

/// Joins on another claimant's marker, labelled `outcome` =
/// `committed` | `vacant` | `timeout`.
pub const IDEMPOTENCY_JOINS: &str = "idempotency.joins";

/// Orders created whose marker could not be upgraded to committed, labelled
/// `reason` = `marker_lost` | `cache_error`.
pub const IDEMPOTENCY_COMMIT_UPGRADE_FAILED: &str = "idempotency.commit_upgrade_failed";

/// Orders inserted into a ledger.
pub use table_orders_core::ledger::LEDGER_ORDERS_CREATED;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the scrape endpoint.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is
    /// already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();

        let addr = self.addr;
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Metrics endpoint stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(IDEMPOTENCY_CLAIMS, "Idempotency claim attempts by outcome");
    describe_counter!(
        IDEMPOTENCY_JOINS,
        "Waits on another request's idempotency claim by outcome"
    );
    describe_counter!(
        IDEMPOTENCY_COMMIT_UPGRADE_FAILED,
        "Orders created whose idempotency marker could not be committed"
    );
    describe_counter!(LEDGER_ORDERS_CREATED, "Orders inserted into the ledger");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_register_without_recorder_is_noop() {
        register_metrics();
    }

    #[test]
    fn test_in_memory_insert_counts_created_orders() {
        use table_orders_core::environment::Clock;
        use table_orders_core::{DishId, LedgerStore, NewOrder, TableId};
        use table_orders_testing::{InMemoryLedgerStore, test_clock};

        let clock = test_clock();
        let ledger = InMemoryLedgerStore::with_clock(clock.clone());
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            for _ in 0..2 {
                let order = NewOrder::new(
                    TableId::new(1),
                    DishId::new(1),
                    clock.now() + chrono::Duration::minutes(5),
                );
                tokio_test::block_on(ledger.insert(order)).unwrap();
            }
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("ledger_orders_created 2"),
            "unexpected render: {rendered}"
        );
    }

    #[tokio::test]
    async fn test_start_installs_recorder_once() {
        let mut server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        server.start().unwrap();
        assert!(server.render().is_some());

        let mut second = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(matches!(second.start(), Err(MetricsError::Install(_))));
        assert!(second.render().is_none());
    }
}
