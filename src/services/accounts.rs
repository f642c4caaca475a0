use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{NewUser, TierChange, UserRecord};
use crate::entitlements::{ResourceKind, TierCatalog, TierId, UsageCounters};
use crate::store::{RecipeStore, StoreError, UserDirectory};

/// Counted resource backing the `upload_recipes` quota. Only public recipes count.
pub const SAVED_RECIPES: &str = "saved_recipes";

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Tier '{0}' is not defined in the entitlement catalog")]
    UnknownTier(TierId),
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("User {0} not found")]
    UserNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Account lifecycle: signup, tier assignment, counter reconciliation.
///
/// All tier writes go through [`AccountService::change_tier`], which refuses
/// identifiers the loaded catalog does not define.
#[derive(Clone)]
pub struct AccountService {
    catalog: Arc<TierCatalog>,
    users: Arc<dyn UserDirectory>,
    usage: Arc<dyn UsageCounters>,
    recipes: Arc<dyn RecipeStore>,
}

impl AccountService {
    pub fn new(
        catalog: Arc<TierCatalog>,
        users: Arc<dyn UserDirectory>,
        usage: Arc<dyn UsageCounters>,
        recipes: Arc<dyn RecipeStore>,
    ) -> Self {
        Self {
            catalog,
            users,
            usage,
            recipes,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    pub async fn sign_up(
        &self,
        email: &str,
        display_name: Option<String>,
    ) -> Result<UserRecord, AccountError> {
        let email = email.trim().to_ascii_lowercase();
        if !is_plausible_email(&email) {
            return Err(AccountError::InvalidEmail(email));
        }

        let user = self
            .users
            .create_user(NewUser {
                email,
                display_name,
                tier: self.catalog.default_tier().clone(),
            })
            .await?;

        tracing::info!(user = %user.id, tier = %user.tier, "account created");
        Ok(user)
    }

    pub async fn find(&self, id: Uuid) -> Result<UserRecord, AccountError> {
        self.users
            .find_user(id)
            .await?
            .ok_or(AccountError::UserNotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>, AccountError> {
        Ok(self.users.list_users().await?)
    }

    pub async fn find_by_customer(&self, customer_id: &str) -> Result<Option<UserRecord>, AccountError> {
        Ok(self.users.find_by_customer(customer_id).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AccountError> {
        Ok(self.users.find_by_email(email).await?)
    }

    pub async fn change_tier(&self, id: Uuid, change: TierChange) -> Result<UserRecord, AccountError> {
        if !self.catalog.contains(&change.tier) {
            return Err(AccountError::UnknownTier(change.tier));
        }

        let user = self.users.set_tier(id, &change).await.map_err(|e| match e {
            StoreError::NotFound(_) => AccountError::UserNotFound(id),
            other => AccountError::Store(other),
        })?;

        tracing::info!(
            user = %user.id,
            tier = %user.tier,
            status = %user.subscription_status,
            "tier changed"
        );
        Ok(user)
    }

    /// Recompute the recipe counter from the public recipe rows. Returns `(before, after)`.
    pub async fn reconcile_usage(&self, id: Uuid) -> Result<(u64, u64), AccountError> {
        self.find(id).await?;

        let resource = ResourceKind::new(SAVED_RECIPES);
        let before = self.usage.current_count(id, &resource).await?;
        let actual = self.recipes.count_public_for_owner(id).await?;
        if before != actual {
            tracing::warn!(user = %id, before, actual, "usage counter drifted, resetting");
            self.usage.reset(id, &resource, actual).await?;
        }
        Ok((before, actual))
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}
