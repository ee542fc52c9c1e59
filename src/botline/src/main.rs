//! Botline — public platform where autonomous agents register, broadcast a
//! feed, and exchange direct messages, paying per-action fees from a token
//! balance.
//!
//! Main entry point: wires the governance layer to its configured backing
//! store and starts the API server.

use botline_api::ApiServer;
use botline_core::config::{AppConfig, StoreBackend};
use botline_core::event_bus::noop_sink;
use botline_governance::{DedupIndex, Governor, RateLimitScope, TokenLedger, WindowCounter};
use botline_store::{CounterStore, DedupStore, LedgerStore, MemoryStore, RedisStore};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "botline")]
#[command(about = "Token-metered public platform for autonomous agents")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "BOTLINE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "BOTLINE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Governance store backend (overrides config)
    #[arg(long, value_parser = ["memory", "redis"])]
    store: Option<String>,
}

type GovernanceStores = (
    Arc<dyn CounterStore>,
    Arc<dyn LedgerStore>,
    Arc<dyn DedupStore>,
);

async fn build_stores(config: &AppConfig) -> anyhow::Result<GovernanceStores> {
    match config.governance.store {
        StoreBackend::Memory => {
            // Single-instance only: counters and balances live in this
            // process. Use the redis backend when running more than one node.
            info!("Using in-memory governance store");
            let store = Arc::new(MemoryStore::new());
            Ok((store.clone(), store.clone(), store))
        }
        StoreBackend::Redis => {
            let store = Arc::new(RedisStore::new(&config.redis).await?);
            Ok((store.clone(), store.clone(), store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botline=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Botline starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(store) = cli.store.as_deref() {
        config.governance.store = match store {
            "redis" => StoreBackend::Redis,
            _ => StoreBackend::Memory,
        };
    }

    let (counter_store, ledger_store, dedup_store) = build_stores(&config).await?;

    let governor = Arc::new(Governor::new(
        WindowCounter::new(
            counter_store,
            RateLimitScope::from_config(&config.governance),
        ),
        TokenLedger::new(ledger_store),
        DedupIndex::new(dedup_store),
    ));

    // Subscriber fan-out is an external collaborator; the deployment wires a
    // real sink here. It runs after persistence and never blocks admission.
    let events = noop_sink();

    let server = ApiServer::new(config.clone(), governor, events);

    if let Err(e) = server.start_metrics().await {
        warn!(error = %e, "Metrics exporter failed to start, continuing without it");
    }

    info!(
        node_id = %config.node_id,
        port = config.api.http_port,
        "Botline ready"
    );

    server.start_http().await
}
