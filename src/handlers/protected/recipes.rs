use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use super::features;
use crate::database::models::{NewRecipe, Recipe};
use crate::entitlements::{Access, FeatureFlag, Reservation};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// GET /api/recipes - the caller's own recipes
pub async fn list(State(state): State<AppState>, user: AuthUser) -> ApiResult<Vec<Recipe>> {
    let recipes = state.recipes.list_for_owner(user.id).await?;
    Ok(ApiResponse::success(recipes))
}

/// POST /api/recipes - gated on `upload_recipes`
///
/// The gate has already reserved a `saved_recipes` slot; any error returned
/// here gives it back.
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(recipe): Json<NewRecipe>,
) -> ApiResult<Recipe> {
    let title = recipe.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation_error("Recipe title is required", None));
    }

    if recipe.is_private {
        let private = FeatureFlag::new(features::PRIVATE_RECIPES);
        if let Access::Denied(denial) = state.resolver.check_access(user.id, &private).await? {
            return Err(denial.into());
        }
    }

    let recipe = NewRecipe {
        title: title.to_string(),
        ingredients: recipe
            .ingredients
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect(),
        is_private: recipe.is_private,
    };
    let created = state.recipes.insert(user.id, recipe).await?;
    // Private recipes do not count toward `saved_recipes`; hand back the slot
    // the gate reserved.
    // Errors past this point would make the gate release the slot again.
    if created.is_private {
        if let Some(slot) = quota_slot(&state, user.id) {
            if let Err(err) = state.resolver.release(&slot).await {
                tracing::error!(user = %user.id, recipe = %created.id, "failed to release slot for private recipe: {}", err);
            }
        }
    }
    tracing::info!(user = %user.id, recipe = %created.id, private = created.is_private, "recipe saved");
    Ok(ApiResponse::created(created))
}

/// DELETE /api/recipes/:id - frees a quota slot once a public row is gone
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let Some(removed) = state.recipes.delete(user.id, id).await? else {
        return Err(ApiError::not_found(format!("Recipe {} not found", id)));
    };

    if !removed.is_private {
        if let Some(slot) = quota_slot(&state, user.id) {
            state.resolver.release(&slot).await?;
        }
    }

    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

/// The counter slot `upload_recipes` draws from, if the catalog meters it.
fn quota_slot(state: &AppState, user: Uuid) -> Option<Reservation> {
    state
        .catalog
        .quota_for(&FeatureFlag::new(features::UPLOAD_RECIPES))
        .map(|resource| Reservation {
            user,
            resource: resource.clone(),
        })
}
