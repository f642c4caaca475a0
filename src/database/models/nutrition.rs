use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Daily nutrition totals for one user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NutritionEntry {
    pub user_id: Uuid,
    pub log_date: NaiveDate,
    pub calories: i32,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NutritionInput {
    pub log_date: NaiveDate,
    #[serde(default)]
    pub calories: i32,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
}
