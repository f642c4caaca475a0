//! Persistence seams. Each concern is an async trait with a PostgreSQL
//! implementation in `crate::database` and an in-process one in [`memory`].

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{
    NewRecipe, NewUser, NutritionEntry, NutritionInput, Recipe, TierChange, UserRecord,
};
use crate::entitlements::TierId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Stored value is invalid: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Users and their single active tier.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_customer(&self, customer_id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Case-insensitive match on the sign-up email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Replace the user's tier. Fails with `NotFound` for unknown users.
    async fn set_tier(&self, id: Uuid, change: &TierChange) -> Result<UserRecord, StoreError>;

    async fn tier_of(&self, id: Uuid) -> Result<Option<TierId>, StoreError> {
        Ok(self.find_user(id).await?.map(|user| user.tier))
    }
}

#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn insert(&self, owner: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError>;

    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Recipe>, StoreError>;

    /// Recipes among `ids` that belong to `owner`, in the order of `ids`.
    async fn find_for_owner(&self, owner: Uuid, ids: &[Uuid]) -> Result<Vec<Recipe>, StoreError>;

    /// Returns the removed row, if there was one.
    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError>;

    /// Public recipes only; private ones do not count toward `saved_recipes`.
    async fn count_public_for_owner(&self, owner: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait NutritionStore: Send + Sync {
    /// Insert or replace the totals for `input.log_date`.
    async fn upsert(&self, user: Uuid, input: NutritionInput) -> Result<NutritionEntry, StoreError>;

    /// Entries from `since` through `until` inclusive, oldest first.
    async fn history(
        &self,
        user: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<NutritionEntry>, StoreError>;
}
