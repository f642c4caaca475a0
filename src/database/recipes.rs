use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{NewRecipe, Recipe};
use crate::store::{RecipeStore, StoreError};

#[derive(Clone)]
pub struct PgRecipeStore {
    pool: PgPool,
}

impl PgRecipeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipeStore for PgRecipeStore {
    async fn insert(&self, owner: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError> {
        let row = sqlx::query_as::<_, Recipe>(
            r#"
            INSERT INTO recipes (id, owner_id, title, ingredients, is_private, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, owner_id, title, ingredients, is_private, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(&recipe.title)
        .bind(&recipe.ingredients)
        .bind(recipe.is_private)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Recipe>, StoreError> {
        let rows = sqlx::query_as::<_, Recipe>(
            "SELECT id, owner_id, title, ingredients, is_private, created_at \
             FROM recipes WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_for_owner(&self, owner: Uuid, ids: &[Uuid]) -> Result<Vec<Recipe>, StoreError> {
        let rows = sqlx::query_as::<_, Recipe>(
            "SELECT id, owner_id, title, ingredients, is_private, created_at \
             FROM recipes WHERE owner_id = $1 AND id = ANY($2)",
        )
        .bind(owner)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        // Preserve the caller's ordering.
        Ok(ids
            .iter()
            .filter_map(|id| rows.iter().find(|r| r.id == *id).cloned())
            .collect())
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let row = sqlx::query_as::<_, Recipe>(
            "DELETE FROM recipes WHERE id = $1 AND owner_id = $2 \
             RETURNING id, owner_id, title, ingredients, is_private, created_at",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn count_public_for_owner(&self, owner: Uuid) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM recipes WHERE owner_id = $1 AND NOT is_private",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}
