use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "HomeGrub API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Recipes, meal planning and nutrition tracking with subscription tiers",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "tiers": "/tiers (public)",
                "billing": "/billing/webhook (shared secret)",
                "account": "/api/me, /api/entitlements/:feature (session)",
                "recipes": "/api/recipes[/:id] (session)",
                "shopping": "/api/shopping-list (session, shopping_list_generation)",
                "nutrition": "/api/nutrition/logs|history|export (session, nutrition_tracking)"
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let Some(database) = &state.database else {
        return (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "memory" }
            })),
        );
    };

    match database.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
