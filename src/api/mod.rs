pub mod cache;
pub mod handler;

use crate::config::{CorsConfig, RateLimitConfig};
use crate::error::{AppError, AppResult};
use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use handler::CounterState;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::{PeerIpKeyExtractor, SmartIpKeyExtractor},
    GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// The public counter endpoint. Preflight `OPTIONS` is answered by the CORS layer.
pub fn counter_routes(state: Arc<CounterState>) -> Router {
    Router::new()
        .route(
            "/api/visitor_counter",
            get(handler::visitor_counter).post(handler::visitor_counter),
        )
        .with_state(state)
}

/// Per-client rate limit on `routes`, answering 429 once the burst is spent.
///
/// Clients are keyed on the socket peer address unless proxy headers are
/// trusted, so a forged `X-Forwarded-For` cannot mint fresh buckets.
pub fn rate_limited(
    routes: Router,
    config: &RateLimitConfig,
    trust_proxy_headers: bool,
) -> AppResult<Router> {
    let invalid = || AppError::Internal("failed to build rate limiter config".to_string());

    let routes = if trust_proxy_headers {
        let governor_conf = GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_second(config.per_second)
            .burst_size(config.burst_size)
            .finish()
            .ok_or_else(invalid)?;
        routes.layer(GovernorLayer::new(governor_conf))
    } else {
        let governor_conf = GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(config.per_second)
            .burst_size(config.burst_size)
            .finish()
            .ok_or_else(invalid)?;
        routes.layer(GovernorLayer::new(governor_conf))
    };
    Ok(routes)
}

/// Read-only routes: stats and health.
pub fn read_routes(state: Arc<CounterState>) -> Router {
    Router::new()
        .route("/api/stats", get(handler::stats))
        .route("/health", get(handler::health))
        .with_state(state)
}

/// CORS for browser callers embedding the counter.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = if config.allows_any() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_rejects_empty_burst() {
        let limits = RateLimitConfig {
            enabled: true,
            per_second: 1,
            burst_size: 0,
        };
        for trust_proxy_headers in [false, true] {
            let result = rate_limited(Router::new(), &limits, trust_proxy_headers);
            assert!(matches!(result, Err(AppError::Internal(_))));
        }
    }
}
