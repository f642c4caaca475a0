use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{NewUser, TierChange, UserRecord};
use crate::entitlements::TierId;
use crate::store::{StoreError, UserDirectory};

const USER_COLUMNS: &str = "id, email, display_name, tier, subscription_status, \
     stripe_customer_id, stripe_subscription_id, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    display_name: Option<String>,
    tier: String,
    subscription_status: String,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserRecord {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            tier: TierId::new(row.tier),
            subscription_status: row.subscription_status.parse().map_err(StoreError::Corrupt)?,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `users` table. The tier column is read on every entitlement check.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, StoreError> {
        let query = format!(
            "INSERT INTO users (id, email, display_name, tier) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        let row: UserRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(&new_user.display_name)
            .bind(new_user.tier.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Conflict(format!("email '{}' already registered", new_user.email))
                }
                other => StoreError::Sqlx(other),
            })?;
        row.try_into()
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE stripe_customer_id = $1", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let query = format!("SELECT {} FROM users ORDER BY created_at", USER_COLUMNS);
        let rows: Vec<UserRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        rows.into_iter().map(UserRecord::try_from).collect()
    }

    async fn set_tier(&self, id: Uuid, change: &TierChange) -> Result<UserRecord, StoreError> {
        let query = format!(
            r#"
            UPDATE users
               SET tier = $2,
                   subscription_status = $3,
                   stripe_customer_id = COALESCE($4, stripe_customer_id),
                   stripe_subscription_id = COALESCE($5, stripe_subscription_id),
                   updated_at = now()
             WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(change.tier.as_str())
            .bind(change.subscription_status.as_str())
            .bind(&change.stripe_customer_id)
            .bind(&change.stripe_subscription_id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?
            .try_into()
    }

    async fn tier_of(&self, id: Uuid) -> Result<Option<TierId>, StoreError> {
        let tier: Option<String> = sqlx::query_scalar("SELECT tier FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tier.map(TierId::new))
    }
}
