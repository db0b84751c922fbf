pub(crate) mod core;
pub(crate) mod dispatch;
pub(crate) mod errors;
pub(crate) mod handlers;
pub(crate) mod metrics;
pub(crate) mod router;
pub(crate) mod types;

pub use self::core::{
    AppConfig, AppState, ReleasedWork, DEFAULT_DENY_RESET_PERIOD_SECS, DEFAULT_DRAIN_DELAY_SECS,
    DEFAULT_FLUSH_PERIOD_SECS,
};
pub use dispatch::{
    BatchCollector, BatchHandler, CollectorConfig, DispatchError, DryRunHandler, HandlerResult,
    SerialDrainQueue, TaskHandler,
};
pub use errors::init_tracing;
pub use router::build_router;
