//! Scheduling of claim and payout work onto injected handlers.
//!
//! Two release disciplines live here:
//!
//! - [`BatchCollector`] admits claims through the value cap and address
//!   cooldown checks and hands the whole pending window to its handler once
//!   per flush period. The cooldown list is wiped in bulk on a longer period.
//! - [`SerialDrainQueue`] accepts every task and releases them one at a time,
//!   oldest first, with a fixed pause after each handler call.
//!
//! Handler errors and panics never escape a scheduled callback: they are
//! logged and counted, and the component moves on to its next cycle.

mod collector;
mod handler;
mod lifecycle;
mod serial;

use drip_core::AdmissionError;

pub use collector::{BatchCollector, CollectorConfig};
pub use handler::{BatchHandler, DryRunHandler, HandlerResult, TaskHandler};
pub use serial::SerialDrainQueue;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("claim rejected: {0}")]
    Rejected(#[from] AdmissionError),
    #[error("dispatcher is shut down")]
    ShutDown,
    #[error("dispatcher is already running")]
    AlreadyRunning,
}
