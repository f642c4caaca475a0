use axum::extract::State;
use serde::Serialize;

use crate::entitlements::{Tier, TierId};
use crate::middleware::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CatalogListing {
    pub version: String,
    pub default_tier: TierId,
    pub tiers: Vec<Tier>,
}

/// GET /tiers - published plans, cheapest first
pub async fn list(State(state): State<AppState>) -> ApiResponse<CatalogListing> {
    ApiResponse::success(CatalogListing {
        version: state.catalog.version().to_string(),
        default_tier: state.catalog.default_tier().clone(),
        tiers: state.catalog.tiers().into_iter().cloned().collect(),
    })
}
