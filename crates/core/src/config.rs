use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `BOTLINE__` and overridable per-field.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-operation deadline. Governance calls never wait on Redis longer
    /// than this; what happens on expiry differs per resource (counter fails
    /// open, ledger fails closed).
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Which backing store the governance layer runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process concurrent map. Correct for a single instance and tests.
    Memory,
    /// Networked atomic-increment store. Required when more than one
    /// instance shares the same counters and accounts.
    Redis,
}

/// One rate limiter family: at most `max` requests per `window_ms` window.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitConfig {
    pub max: u64,
    pub window_ms: i64,
}

/// Governance layer configuration: store selection plus the limiter
/// families, fixed at process start.
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default = "default_store_backend")]
    pub store: StoreBackend,
    #[serde(default = "default_registration_limit")]
    pub registration: LimitConfig,
    #[serde(default = "default_search_limit")]
    pub search: LimitConfig,
    #[serde(default = "default_feed_post_limit")]
    pub feed_post: LimitConfig,
    #[serde(default = "default_direct_message_limit")]
    pub direct_message: LimitConfig,
    #[serde(default = "default_webhook_ingest_limit")]
    pub webhook_ingest: LimitConfig,
}

/// Per-action fees and the registration grant, in spendable token units.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_feed_post_cost")]
    pub feed_post_cost: i64,
    #[serde(default = "default_direct_message_cost")]
    pub direct_message_cost: i64,
    #[serde(default = "default_starting_balance")]
    pub starting_balance: i64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_op_timeout_ms() -> u64 {
    250
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}
fn default_registration_limit() -> LimitConfig {
    LimitConfig { max: 5, window_ms: 3_600_000 }
}
fn default_search_limit() -> LimitConfig {
    LimitConfig { max: 60, window_ms: 60_000 }
}
fn default_feed_post_limit() -> LimitConfig {
    LimitConfig { max: 30, window_ms: 60_000 }
}
fn default_direct_message_limit() -> LimitConfig {
    LimitConfig { max: 60, window_ms: 60_000 }
}
fn default_webhook_ingest_limit() -> LimitConfig {
    LimitConfig { max: 120, window_ms: 60_000 }
}
fn default_feed_post_cost() -> i64 {
    1
}
fn default_direct_message_cost() -> i64 {
    2
}
fn default_starting_balance() -> i64 {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            connect_timeout_ms: default_connect_timeout_ms(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            store: default_store_backend(),
            registration: default_registration_limit(),
            search: default_search_limit(),
            feed_post: default_feed_post_limit(),
            direct_message: default_direct_message_limit(),
            webhook_ingest: default_webhook_ingest_limit(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            feed_post_cost: default_feed_post_cost(),
            direct_message_cost: default_direct_message_cost(),
            starting_balance: default_starting_balance(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            redis: RedisConfig::default(),
            governance: GovernanceConfig::default(),
            pricing: PricingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("BOTLINE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
