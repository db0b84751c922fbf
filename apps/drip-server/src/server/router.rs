use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderName, StatusCode},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{
    core::{AppConfig, AppState},
    handlers::{submit_claim, submit_payout},
    types::{health, metrics},
};

/// Build the axum router over an already constructed [`AppState`].
///
/// # Errors
/// Returns an error if configured security limits are invalid.
pub fn build_router(config: &AppConfig, state: AppState) -> anyhow::Result<Router> {
    if config.rate_limit_requests_per_minute == 0 {
        return Err(anyhow!(
            "rate limit must be at least 1 request per minute"
        ));
    }
    if config.max_body_bytes == 0 {
        return Err(anyhow!("max body bytes must be at least 1 byte"));
    }

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .period(Duration::from_secs(60))
            .burst_size(config.rate_limit_requests_per_minute)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("invalid governor configuration"))?,
    );
    let request_id_header = HeaderName::from_static("x-request-id");
    let governor_layer = GovernorLayer::new(governor_config);

    Ok(Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/claims", post(submit_claim))
        .route("/payouts", post(submit_payout))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
                .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                ))
                .layer(governor_layer),
        ))
}
