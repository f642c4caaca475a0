use axum::{extract::State, http::HeaderMap, Json};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{BillingOutcome, WebhookEvent};
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// POST /billing/webhook - subscription lifecycle events
///
/// Authenticated by a shared secret header rather than a session. Tier
/// changes applied here are visible to the user's very next request.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> ApiResult<BillingOutcome> {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    state.billing.verify_secret(presented).map_err(ApiError::from)?;

    let outcome = state.billing.apply_event(&event).await?;
    tracing::info!(event = ?event.id, kind = %event.kind, outcome = ?outcome, "billing event processed");
    Ok(ApiResponse::success(outcome))
}
