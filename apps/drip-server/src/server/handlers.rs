use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use drip_core::{ClaimRequest, WalletAddress};

use crate::server::{
    core::AppState,
    errors::ApiFailure,
    types::{ClaimQueuedResponse, ClaimSubmission, PayoutQueuedResponse},
};

fn parse_submission(
    payload: Result<Json<ClaimSubmission>, JsonRejection>,
    route: &'static str,
) -> Result<ClaimRequest, ApiFailure> {
    let Json(submission) = payload.map_err(|rejection| {
        tracing::warn!(event = "http.submit", route, outcome = "invalid_body", error = %rejection);
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiFailure::PayloadTooLarge
        } else {
            ApiFailure::InvalidRequest
        }
    })?;
    let address = WalletAddress::try_from(submission.address).map_err(|_| {
        tracing::warn!(event = "http.submit", route, outcome = "invalid_address");
        ApiFailure::InvalidRequest
    })?;
    Ok(ClaimRequest::new(address, submission.value).with_fields(submission.fields))
}

pub(crate) async fn submit_claim(
    State(state): State<AppState>,
    payload: Result<Json<ClaimSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<ClaimQueuedResponse>), ApiFailure> {
    let request = parse_submission(payload, "claims")?;
    let claim_id = request.id();
    state.collector.enqueue(request)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ClaimQueuedResponse {
            claim_id: claim_id.to_string(),
            status: "queued",
        }),
    ))
}

pub(crate) async fn submit_payout(
    State(state): State<AppState>,
    payload: Result<Json<ClaimSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<PayoutQueuedResponse>), ApiFailure> {
    let request = parse_submission(payload, "payouts")?;
    let task_id = request.id();
    state.payouts.enqueue(request)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PayoutQueuedResponse {
            task_id: task_id.to_string(),
            status: "queued",
        }),
    ))
}
