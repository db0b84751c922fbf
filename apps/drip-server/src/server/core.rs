use std::{
    collections::HashMap,
    sync::{Mutex, OnceLock},
    time::Duration,
};

use anyhow::anyhow;
use drip_core::{ClaimRequest, Origin, SigningKey, WalletAddress, DEFAULT_MAX_CLAIM_VALUE};

use super::dispatch::{
    BatchCollector, BatchHandler, CollectorConfig, DispatchError, DryRunHandler,
    SerialDrainQueue, TaskHandler,
};

pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 16 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_REQUESTS_PER_MINUTE: u32 = 60;
pub const DEFAULT_FLUSH_PERIOD_SECS: u64 = 60;
pub const DEFAULT_DENY_RESET_PERIOD_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_DRAIN_DELAY_SECS: u64 = 15;
pub(crate) const METRICS_TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub(crate) static METRICS_STATE: OnceLock<MetricsState> = OnceLock::new();

#[derive(Default)]
pub(crate) struct MetricsState {
    pub(crate) admissions: Mutex<HashMap<(&'static str, &'static str), u64>>,
    pub(crate) batches_released: Mutex<HashMap<&'static str, u64>>,
    pub(crate) items_released: Mutex<HashMap<&'static str, u64>>,
    pub(crate) handler_calls: Mutex<HashMap<(&'static str, &'static str), u64>>,
    pub(crate) discarded: Mutex<HashMap<&'static str, u64>>,
    pub(crate) drain_tasks: Mutex<u64>,
    pub(crate) deny_resets: Mutex<u64>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub rate_limit_requests_per_minute: u32,
    pub flush_period: Duration,
    pub deny_reset_period: Duration,
    pub drain_delay: Duration,
    pub max_claim_value: u64,
    pub origin_address: Option<String>,
    pub origin_signing_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_JSON_BODY_LIMIT_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            rate_limit_requests_per_minute: DEFAULT_RATE_LIMIT_REQUESTS_PER_MINUTE,
            flush_period: Duration::from_secs(DEFAULT_FLUSH_PERIOD_SECS),
            deny_reset_period: Duration::from_secs(DEFAULT_DENY_RESET_PERIOD_SECS),
            drain_delay: Duration::from_secs(DEFAULT_DRAIN_DELAY_SECS),
            max_claim_value: DEFAULT_MAX_CLAIM_VALUE,
            origin_address: None,
            origin_signing_key: None,
        }
    }
}

/// Shared handle to both dispatch components, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub(crate) collector: BatchCollector,
    pub(crate) payouts: SerialDrainQueue<ClaimRequest>,
}

/// Work still queued when the components were stopped.
#[derive(Debug, Default)]
pub struct ReleasedWork {
    pub claims: Vec<ClaimRequest>,
    pub payouts: Vec<ClaimRequest>,
}

impl AppState {
    /// Builds both components around the dry-run handler.
    ///
    /// # Errors
    /// Returns an error when the origin is missing or invalid, or a period or
    /// cap is zero.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        Self::with_handlers(config, DryRunHandler, DryRunHandler)
    }

    /// # Errors
    /// Same as [`AppState::new`].
    pub fn with_handlers(
        config: &AppConfig,
        batch_handler: impl BatchHandler,
        payout_handler: impl TaskHandler<ClaimRequest>,
    ) -> anyhow::Result<Self> {
        validate_dispatch_config(config)?;
        let origin = build_origin(config)?;
        let collector = BatchCollector::new(
            CollectorConfig {
                flush_period: config.flush_period,
                deny_reset_period: config.deny_reset_period,
                max_claim_value: config.max_claim_value,
            },
            origin.clone(),
            batch_handler,
        );
        let payouts = SerialDrainQueue::new(config.drain_delay, origin, payout_handler);
        Ok(Self { collector, payouts })
    }

    /// Arms the collector timers. The payout queue starts on demand.
    ///
    /// # Errors
    /// Returns a [`DispatchError`] when already started or already shut down.
    pub fn start(&self) -> Result<(), DispatchError> {
        self.collector.start()
    }

    pub async fn shutdown(&self) -> ReleasedWork {
        let claims = self.collector.stop().await;
        let payouts = self.payouts.stop().await;
        ReleasedWork { claims, payouts }
    }

    #[must_use]
    pub fn collector(&self) -> &BatchCollector {
        &self.collector
    }

    #[must_use]
    pub fn payouts(&self) -> &SerialDrainQueue<ClaimRequest> {
        &self.payouts
    }
}

fn validate_dispatch_config(config: &AppConfig) -> anyhow::Result<()> {
    if config.flush_period.is_zero() {
        return Err(anyhow!("flush period must be at least 1 second"));
    }
    if config.deny_reset_period.is_zero() {
        return Err(anyhow!("deny reset period must be at least 1 second"));
    }
    if config.max_claim_value == 0 {
        return Err(anyhow!("max claim value must be at least 1"));
    }
    Ok(())
}

fn build_origin(config: &AppConfig) -> anyhow::Result<Origin> {
    let address = config
        .origin_address
        .clone()
        .ok_or_else(|| anyhow!("origin address is required"))?;
    let signing_key = config
        .origin_signing_key
        .clone()
        .ok_or_else(|| anyhow!("origin signing key is required"))?;
    let address =
        WalletAddress::try_from(address).map_err(|e| anyhow!("invalid origin address: {e}"))?;
    let signing_key =
        SigningKey::try_from(signing_key).map_err(|e| anyhow!("invalid origin signing key: {e}"))?;
    Ok(Origin::new(address, signing_key))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{AppConfig, AppState};

    fn config() -> AppConfig {
        AppConfig {
            origin_address: Some(String::from("origin1")),
            origin_signing_key: Some(String::from("secret-key")),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn builds_state_from_complete_config() {
        let state = AppState::new(&config()).unwrap();
        state.start().unwrap();

        assert!(state.collector().is_running());
        assert_eq!(state.payouts().delay(), Duration::from_secs(15));
        let released = state.shutdown().await;
        assert!(released.claims.is_empty());
        assert!(released.payouts.is_empty());
    }

    #[test]
    fn rejects_missing_origin() {
        let missing_key = AppConfig {
            origin_signing_key: None,
            ..config()
        };
        let error = AppState::new(&missing_key).err().unwrap();
        assert_eq!(error.to_string(), "origin signing key is required");

        let missing_address = AppConfig {
            origin_address: None,
            ..config()
        };
        assert!(AppState::new(&missing_address).is_err());
    }

    #[test]
    fn rejects_invalid_origin_values() {
        let bad_address = AppConfig {
            origin_address: Some(String::from("not an address")),
            ..config()
        };
        assert!(AppState::new(&bad_address).is_err());

        let blank_key = AppConfig {
            origin_signing_key: Some(String::from("   ")),
            ..config()
        };
        assert!(AppState::new(&blank_key).is_err());
    }

    #[test]
    fn rejects_zero_periods_and_cap() {
        for broken in [
            AppConfig {
                flush_period: Duration::ZERO,
                ..config()
            },
            AppConfig {
                deny_reset_period: Duration::ZERO,
                ..config()
            },
            AppConfig {
                max_claim_value: 0,
                ..config()
            },
        ] {
            assert!(AppState::new(&broken).is_err());
        }
    }

    #[test]
    fn origin_debug_output_hides_signing_key() {
        let origin = super::build_origin(&config()).unwrap();

        assert!(!format!("{origin:?}").contains("secret-key"));
    }
}
