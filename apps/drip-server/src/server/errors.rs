use axum::{http::StatusCode, response::IntoResponse, Json};
use drip_core::AdmissionError;
use tracing_subscriber::EnvFilter;

use super::{dispatch::DispatchError, types::ApiError};

#[derive(Debug)]
pub(crate) enum ApiFailure {
    InvalidRequest,
    PayloadTooLarge,
    Rejected(AdmissionError),
    ShuttingDown,
}

impl From<DispatchError> for ApiFailure {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Rejected(rejection) => Self::Rejected(rejection),
            DispatchError::ShutDown | DispatchError::AlreadyRunning => Self::ShuttingDown,
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            Self::InvalidRequest => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Self::Rejected(rejection) => {
                let status = match rejection {
                    AdmissionError::ValueExceedsCap { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    AdmissionError::AddressCoolingDown => StatusCode::TOO_MANY_REQUESTS,
                    AdmissionError::AddressAlreadyQueued => StatusCode::CONFLICT,
                };
                (status, rejection.code())
            }
            Self::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
        };
        (status, Json(ApiError { error })).into_response()
    }
}

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info,drip_server=debug,tower_http=info";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the JSON subscriber. Event fields land at the top level of each
/// line so `event = "dispatch..."` can be matched without unwrapping.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(false)
        .with_env_filter(log_filter())
        .init();
}
