use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::features;
use crate::database::models::{NutritionEntry, NutritionInput};
use crate::entitlements::{Limit, ResourceKind};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct History {
    pub days: u32,
    /// First day of the window; `None` when the tier allows no history.
    pub since: Option<NaiveDate>,
    pub entries: Vec<NutritionEntry>,
}

/// POST /api/nutrition/logs - record or replace one day's totals
pub async fn log(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<NutritionInput>,
) -> ApiResult<NutritionEntry> {
    if input.calories < 0 || input.protein < 0.0 || input.carbs < 0.0 || input.fat < 0.0 {
        return Err(ApiError::validation_error("Nutrition values cannot be negative", None));
    }
    let entry = state.nutrition.upsert(user.id, input).await?;
    Ok(ApiResponse::created(entry))
}

/// GET /api/nutrition/history?days=N
pub async fn history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<History> {
    let days = window_days(&state, &user, query.days).await?;
    let today = Utc::now().date_naive();
    let since = window_start(today, days);
    let entries = match since {
        Some(since) => state.nutrition.history(user.id, since, today).await?,
        None => Vec::new(),
    };

    Ok(ApiResponse::success(History { days, since, entries }))
}

/// GET /api/nutrition/export?days=N - CSV download, gated on `nutrition_analysis`
pub async fn export(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let days = window_days(&state, &user, query.days).await?;
    let today = Utc::now().date_naive();
    let entries = match window_start(today, days) {
        Some(since) => state.nutrition.history(user.id, since, today).await?,
        None => Vec::new(),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"nutrition.csv\""),
        ],
        to_csv(&entries),
    ))
}

/// Requested window clamped to the tier's `history_days` and the server ceiling.
async fn window_days(state: &AppState, user: &AuthUser, requested: Option<u32>) -> Result<u32, ApiError> {
    let api = &state.config.api;
    let requested = requested.unwrap_or(api.default_history_days).max(1);

    let tier_limit = state
        .resolver
        .limit_of(user.id, &ResourceKind::new(features::HISTORY_DAYS))
        .await?;
    Ok(clamp_window(requested, tier_limit, api.max_history_days))
}

/// First day of a `days`-long window ending on `today`, both ends inclusive.
fn window_start(today: NaiveDate, days: u32) -> Option<NaiveDate> {
    let span = i64::from(days.checked_sub(1)?);
    Some(today - Duration::days(span))
}

fn clamp_window(requested: u32, tier_limit: Limit, ceiling: u32) -> u32 {
    let allowed = match tier_limit {
        Limit::Unlimited => ceiling,
        Limit::Max(max) => u32::try_from(max).unwrap_or(u32::MAX).min(ceiling),
    };
    requested.min(allowed)
}

fn to_csv(entries: &[NutritionEntry]) -> String {
    let mut out = String::from("date,calories,protein,carbs,fat\n");
    for e in entries {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{},{},{:.1},{:.1},{:.1}", e.log_date, e.calories, e.protein, e.carbs, e.fat);
    }
    out
}
