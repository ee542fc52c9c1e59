use botline_core::config::GovernanceConfig;

/// Well-known limiter family names.
pub mod scopes {
    pub const REGISTRATION: &str = "registration";
    pub const SEARCH: &str = "search";
    pub const FEED_POST: &str = "feed-post";
    pub const DIRECT_MESSAGE: &str = "direct-message";
    pub const WEBHOOK_INGEST: &str = "webhook-ingest";
}

/// One limiter family: at most `max` admissions per `window_ms` fixed
/// window. Immutable; the full set is defined at process start.
#[derive(Debug, Clone)]
pub struct RateLimitScope {
    pub name: String,
    pub max: u64,
    pub window_ms: i64,
}

impl RateLimitScope {
    pub fn new(name: impl Into<String>, max: u64, window_ms: i64) -> Self {
        Self {
            name: name.into(),
            max,
            window_ms,
        }
    }

    /// Build the configured limiter families.
    pub fn from_config(config: &GovernanceConfig) -> Vec<Self> {
        vec![
            Self::new(scopes::REGISTRATION, config.registration.max, config.registration.window_ms),
            Self::new(scopes::SEARCH, config.search.max, config.search.window_ms),
            Self::new(scopes::FEED_POST, config.feed_post.max, config.feed_post.window_ms),
            Self::new(
                scopes::DIRECT_MESSAGE,
                config.direct_message.max,
                config.direct_message.window_ms,
            ),
            Self::new(
                scopes::WEBHOOK_INGEST,
                config.webhook_ingest.max,
                config.webhook_ingest.window_ms,
            ),
        ]
    }
}
