use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::models::Recipe;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ShoppingListRequest {
    /// Recipes to shop for. Empty means every recipe the caller owns.
    #[serde(default)]
    pub recipe_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ShoppingList {
    pub recipes: Vec<Uuid>,
    pub items: Vec<String>,
}

/// POST /api/shopping-list - gated on `shopping_list_generation`
pub async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ShoppingListRequest>,
) -> ApiResult<ShoppingList> {
    let recipes = if request.recipe_ids.is_empty() {
        state.recipes.list_for_owner(user.id).await?
    } else {
        state.recipes.find_for_owner(user.id, &request.recipe_ids).await?
    };

    Ok(ApiResponse::success(ShoppingList {
        recipes: recipes.iter().map(|r| r.id).collect(),
        items: merge_ingredients(&recipes),
    }))
}

/// Ingredients across `recipes`, de-duplicated case-insensitively, first spelling wins.
pub fn merge_ingredients(recipes: &[Recipe]) -> Vec<String> {
    let mut seen = HashSet::new();
    recipes
        .iter()
        .flat_map(|recipe| recipe.ingredients.iter())
        .map(|item| item.trim())
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .map(str::to_string)
        .collect()
}
