use axum::extract::{Path, State};
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::SubscriptionStatus;
use crate::entitlements::{Access, Denial, EntitlementSummary, FeatureFlag};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub subscription_status: SubscriptionStatus,
    #[serde(flatten)]
    pub entitlements: EntitlementSummary,
}

/// GET /api/me - account, tier, features and current usage
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Profile> {
    let account = state.accounts.find(user.id).await?;
    let entitlements = state.resolver.summary(user.id).await?;

    Ok(ApiResponse::success(Profile {
        id: account.id,
        email: account.email,
        display_name: account.display_name,
        subscription_status: account.subscription_status,
        entitlements,
    }))
}

#[derive(Debug, Serialize)]
pub struct FeatureCheck {
    pub feature: FeatureFlag,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<Denial>,
}

/// GET /api/entitlements/:feature - read-only check, for UI hints
pub async fn check(
    State(state): State<AppState>,
    user: AuthUser,
    Path(feature): Path<String>,
) -> ApiResult<FeatureCheck> {
    let feature = FeatureFlag::new(feature);
    let access = state.resolver.check_access(user.id, &feature).await?;

    let (allowed, denial) = match access {
        Access::Allowed => (true, None),
        Access::Denied(denial) => (false, Some(denial)),
    };
    Ok(ApiResponse::success(FeatureCheck {
        feature,
        allowed,
        denial,
    }))
}
