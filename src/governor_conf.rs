use crate::server::rate_limiter::ClientKeyExtractor;
use anyhow::{Error, anyhow};
use governor::middleware::NoOpMiddleware;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};

// one request replenished per second, up to `burst` in a row
pub fn get_governor_conf(
    burst: u32,
) -> Result<GovernorConfig<ClientKeyExtractor, NoOpMiddleware>, Error> {
    GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(burst)
        .key_extractor(ClientKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit configuration: burst {}", burst))
}
