use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{NutritionEntry, NutritionInput};
use crate::store::{NutritionStore, StoreError};

#[derive(Clone)]
pub struct PgNutritionStore {
    pool: PgPool,
}

impl PgNutritionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NutritionStore for PgNutritionStore {
    async fn upsert(&self, user: Uuid, input: NutritionInput) -> Result<NutritionEntry, StoreError> {
        let row = sqlx::query_as::<_, NutritionEntry>(
            r#"
            INSERT INTO nutrition_logs (user_id, log_date, calories, protein, carbs, fat)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, log_date)
            DO UPDATE SET calories = EXCLUDED.calories,
                          protein = EXCLUDED.protein,
                          carbs = EXCLUDED.carbs,
                          fat = EXCLUDED.fat
            RETURNING user_id, log_date, calories, protein, carbs, fat
            "#,
        )
        .bind(user)
        .bind(input.log_date)
        .bind(input.calories)
        .bind(input.protein)
        .bind(input.carbs)
        .bind(input.fat)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn history(
        &self,
        user: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<NutritionEntry>, StoreError> {
        let rows = sqlx::query_as::<_, NutritionEntry>(
            "SELECT user_id, log_date, calories, protein, carbs, fat \
             FROM nutrition_logs WHERE user_id = $1 AND log_date BETWEEN $2 AND $3 ORDER BY log_date",
        )
        .bind(user)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
