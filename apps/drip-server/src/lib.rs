#![forbid(unsafe_code)]

mod server;

pub use server::{
    build_router, init_tracing, AppConfig, AppState, BatchCollector, BatchHandler,
    CollectorConfig, DispatchError, DryRunHandler, HandlerResult, ReleasedWork,
    SerialDrainQueue, TaskHandler, DEFAULT_DENY_RESET_PERIOD_SECS, DEFAULT_DRAIN_DELAY_SECS,
    DEFAULT_FLUSH_PERIOD_SECS,
};
