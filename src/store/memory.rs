//! In-process stores for `STORAGE_BACKEND=memory` and for tests.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NutritionStore, RecipeStore, StoreError, UserDirectory};
use crate::database::models::{
    NewRecipe, NewUser, NutritionEntry, NutritionInput, Recipe, SubscriptionStatus, TierChange,
    UserRecord,
};

#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&new_user.email)) {
            return Err(StoreError::Conflict(format!("email '{}' already registered", new_user.email)));
        }

        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: new_user.email,
            display_name: new_user.display_name,
            tier: new_user.tier,
            subscription_status: SubscriptionStatus::Inactive,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut users: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn set_tier(&self, id: Uuid, change: &TierChange) -> Result<UserRecord, StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;

        user.tier = change.tier.clone();
        user.subscription_status = change.subscription_status;
        if change.stripe_customer_id.is_some() {
            user.stripe_customer_id = change.stripe_customer_id.clone();
        }
        if change.stripe_subscription_id.is_some() {
            user.stripe_subscription_id = change.stripe_subscription_id.clone();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecipeStore {
    recipes: RwLock<Vec<Recipe>>,
}

impl MemoryRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    async fn insert(&self, owner: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError> {
        let recipe = Recipe {
            id: Uuid::new_v4(),
            owner_id: owner,
            title: recipe.title,
            ingredients: recipe.ingredients,
            is_private: recipe.is_private,
            created_at: Utc::now(),
        };
        self.recipes.write().await.push(recipe.clone());
        Ok(recipe)
    }

    async fn list_for_owner(&self, owner: Uuid) -> Result<Vec<Recipe>, StoreError> {
        let recipes = self.recipes.read().await;
        Ok(recipes.iter().filter(|r| r.owner_id == owner).cloned().collect())
    }

    async fn find_for_owner(&self, owner: Uuid, ids: &[Uuid]) -> Result<Vec<Recipe>, StoreError> {
        let recipes = self.recipes.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| recipes.iter().find(|r| r.id == *id && r.owner_id == owner))
            .cloned()
            .collect())
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let mut recipes = self.recipes.write().await;
        let position = recipes.iter().position(|r| r.id == id && r.owner_id == owner);
        Ok(position.map(|index| recipes.remove(index)))
    }

    async fn count_public_for_owner(&self, owner: Uuid) -> Result<u64, StoreError> {
        let recipes = self.recipes.read().await;
        Ok(recipes
            .iter()
            .filter(|r| r.owner_id == owner && !r.is_private)
            .count() as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryNutritionStore {
    entries: RwLock<HashMap<Uuid, BTreeMap<NaiveDate, NutritionEntry>>>,
}

impl MemoryNutritionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NutritionStore for MemoryNutritionStore {
    async fn upsert(&self, user: Uuid, input: NutritionInput) -> Result<NutritionEntry, StoreError> {
        let entry = NutritionEntry {
            user_id: user,
            log_date: input.log_date,
            calories: input.calories,
            protein: input.protein,
            carbs: input.carbs,
            fat: input.fat,
        };
        self.entries
            .write()
            .await
            .entry(user)
            .or_default()
            .insert(entry.log_date, entry.clone());
        Ok(entry)
    }

    async fn history(
        &self,
        user: Uuid,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<NutritionEntry>, StoreError> {
        if since > until {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().await;
        Ok(entries
            .get(&user)
            .map(|days| days.range(since..=until).map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlements::TierId;

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let users = MemoryUserDirectory::new();
        let new_user = |email: &str| NewUser {
            email: email.to_string(),
            display_name: None,
            tier: TierId::new("free"),
        };

        users.create_user(new_user("cook@example.com")).await.unwrap();
        let err = users.create_user(new_user("COOK@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn set_tier_on_missing_user_is_not_found() {
        let users = MemoryUserDirectory::new();
        let err = users
            .set_tier(Uuid::new_v4(), &TierChange::manual(TierId::new("home")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn recipes_are_owner_scoped() {
        let store = MemoryRecipeStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let recipe = store
            .insert(
                owner,
                NewRecipe {
                    title: "Soup".into(),
                    ingredients: vec!["leek".into()],
                    is_private: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.count_public_for_owner(owner).await.unwrap(), 1);
        assert!(store.find_for_owner(other, &[recipe.id]).await.unwrap().is_empty());
        assert!(store.delete(other, recipe.id).await.unwrap().is_none());
        assert_eq!(store.delete(owner, recipe.id).await.unwrap().map(|r| r.id), Some(recipe.id));
        assert_eq!(store.count_public_for_owner(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nutrition_upsert_replaces_same_day() {
        let store = MemoryNutritionStore::new();
        let user = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let input = |calories| NutritionInput {
            log_date: day,
            calories,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
        };

        store.upsert(user, input(1800)).await.unwrap();
        store.upsert(user, input(2100)).await.unwrap();

        let history = store.history(user, day, day).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].calories, 2100);
    }
}
