use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entitlements::{ResourceKind, UsageCounters};
use crate::store::StoreError;

/// `usage_counters` rows keyed by (user_id, resource).
///
/// Every mutation is a single statement so concurrent requests for the same
/// user never lose an update; the `count >= 0` CHECK backs the floor.
#[derive(Clone)]
pub struct PgUsageCounters {
    pool: PgPool,
}

impl PgUsageCounters {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_count(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative usage count {}", raw)))
}

fn to_db(count: u64) -> Result<i64, StoreError> {
    i64::try_from(count).map_err(|_| StoreError::Corrupt(format!("usage count {} out of range", count)))
}

#[async_trait]
impl UsageCounters for PgUsageCounters {
    async fn current_count(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT count FROM usage_counters WHERE user_id = $1 AND resource = $2",
        )
        .bind(user)
        .bind(resource.as_str())
        .fetch_optional(&self.pool)
        .await?;
        to_count(count.unwrap_or(0))
    }

    async fn increment(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO usage_counters (user_id, resource, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, resource)
            DO UPDATE SET count = usage_counters.count + 1, updated_at = now()
            RETURNING count
            "#,
        )
        .bind(user)
        .bind(resource.as_str())
        .fetch_one(&self.pool)
        .await?;
        to_count(count)
    }

    async fn decrement(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE usage_counters
               SET count = GREATEST(count - 1, 0), updated_at = now()
             WHERE user_id = $1 AND resource = $2
            RETURNING count
            "#,
        )
        .bind(user)
        .bind(resource.as_str())
        .fetch_optional(&self.pool)
        .await?;
        to_count(count.unwrap_or(0))
    }

    async fn try_increment(
        &self,
        user: Uuid,
        resource: &ResourceKind,
        max: u64,
    ) -> Result<Option<u64>, StoreError> {
        if max == 0 {
            return Ok(None);
        }

        // The conditional upsert returns no row when the existing count is at max.
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO usage_counters (user_id, resource, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, resource)
            DO UPDATE SET count = usage_counters.count + 1, updated_at = now()
             WHERE usage_counters.count < $3
            RETURNING count
            "#,
        )
        .bind(user)
        .bind(resource.as_str())
        .bind(to_db(max)?)
        .fetch_optional(&self.pool)
        .await?;

        count.map(to_count).transpose()
    }

    async fn reset(&self, user: Uuid, resource: &ResourceKind, count: u64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, resource, count)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, resource)
            DO UPDATE SET count = EXCLUDED.count, updated_at = now()
            "#,
        )
        .bind(user)
        .bind(resource.as_str())
        .bind(to_db(count)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
