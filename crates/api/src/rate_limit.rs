//! Rate Limiting Configuration using GCRA
//!
//! Builds a tower_governor config for IP-keyed rate limiting of the
//! dashboard API. GCRA enforces rates accurately without a background
//! sweeper task.

use governor::middleware::StateInformationMiddleware;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config keyed by peer IP; `use_headers()` adds X-RateLimit-*
/// headers so dashboard clients can see their remaining quota
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Seconds per replenished request
    pub per_second: u64,
    /// Burst size (max requests served back-to-back)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst_size: 20, // dashboard polls several endpoints per refresh
        }
    }
}

impl RateLimitConfig {
    /// Tight limits for the lifecycle action endpoints
    pub fn strict() -> Self {
        Self {
            per_second: 2,
            burst_size: 5,
        }
    }
}

/// Create a rate limiting governor config
///
/// The returned config is used with `GovernorLayer`; IP extraction requires
/// serving with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_governor_config(config: &RateLimitConfig) -> Arc<DefaultGovernorConfig> {
    Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.per_second)
            .burst_size(config.burst_size)
            .use_headers()
            .finish()
            .expect("rate limit config has non-zero period and burst"),
    )
}
