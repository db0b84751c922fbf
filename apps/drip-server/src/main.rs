#![forbid(unsafe_code)]

use std::{fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use drip_server::{build_router, init_tracing, AppConfig, AppState};
use tokio::net::TcpListener;

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    std::env::var(name).map_or_else(
        |_| Ok(default),
        |value| {
            value
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {name} value {value:?}: {e}"))
        },
    )
}

fn env_secs_or(name: &str, default: Duration) -> anyhow::Result<Duration> {
    env_or(name, default.as_secs()).map(Duration::from_secs)
}

fn load_config() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();
    let origin_address = std::env::var("DRIP_ORIGIN_ADDRESS")
        .map_err(|_| anyhow::anyhow!("DRIP_ORIGIN_ADDRESS is required for runtime"))?;
    let origin_signing_key = std::env::var("DRIP_ORIGIN_SIGNING_KEY")
        .map_err(|_| anyhow::anyhow!("DRIP_ORIGIN_SIGNING_KEY is required for runtime"))?;

    Ok(AppConfig {
        flush_period: env_secs_or("DRIP_FLUSH_PERIOD_SECS", defaults.flush_period)?,
        deny_reset_period: env_secs_or("DRIP_DENY_RESET_PERIOD_SECS", defaults.deny_reset_period)?,
        drain_delay: env_secs_or("DRIP_DRAIN_DELAY_SECS", defaults.drain_delay)?,
        max_claim_value: env_or("DRIP_MAX_CLAIM_VALUE", defaults.max_claim_value)?,
        rate_limit_requests_per_minute: env_or(
            "DRIP_RATE_LIMIT_REQUESTS_PER_MINUTE",
            defaults.rate_limit_requests_per_minute,
        )?,
        origin_address: Some(origin_address),
        origin_signing_key: Some(origin_signing_key),
        ..defaults
    })
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(event = "server.shutdown", error = %error, "failed to listen for ctrl-c");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_config = load_config()?;
    let state = AppState::new(&app_config)?;
    state.start()?;
    let app = build_router(&app_config, state.clone())?;
    let addr = std::env::var("DRIP_BIND_ADDR")
        .unwrap_or_else(|_| String::from("0.0.0.0:3000"))
        .parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("invalid DRIP_BIND_ADDR: {e}"))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "drip-server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let released = state.shutdown().await;
    tracing::info!(
        event = "server.shutdown",
        claims_released = released.claims.len(),
        payouts_released = released.payouts.len(),
        "dispatchers stopped"
    );
    Ok(())
}
