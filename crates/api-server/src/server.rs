//! API server — HTTP router and metrics exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use botline_core::config::AppConfig;
use botline_core::event_bus::EventSink;
use botline_governance::Governor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Governed write surface
        .route("/v1/bots", post(rest::register_bot))
        .route("/v1/feed", post(rest::post_feed))
        .route("/v1/messages", post(rest::send_message))
        .route("/v1/webhooks/ingest", post(rest::ingest_webhook))
        // Account surface
        .route("/v1/bots/:username/balance", get(rest::get_balance))
        .route("/v1/bots/:username/credits", post(rest::credit_account))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server managing the REST endpoints and metrics exporter.
pub struct ApiServer {
    config: AppConfig,
    governor: Arc<Governor>,
    events: Arc<dyn EventSink>,
}

impl ApiServer {
    pub fn new(config: AppConfig, governor: Arc<Governor>, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            governor,
            events,
        }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            governor: self.governor.clone(),
            events: self.events.clone(),
            pricing: self.config.pricing.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        let app = router(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        // Peer addresses back the IP-keyed limiter scopes when no proxy
        // header is present.
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
