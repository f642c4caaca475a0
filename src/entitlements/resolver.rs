use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::catalog::{FeatureFlag, Limit, ResourceKind, Tier, TierCatalog, TierId, UnknownTierError};
use super::usage::UsageCounters;
use crate::store::{StoreError, UserDirectory};

/// Why an authenticated user was refused a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    /// The user's tier does not include the feature. Remedy: upgrade.
    TierInsufficient,
    /// The feature is included but its quota is used up. Remedy: free a slot or upgrade.
    LimitReached,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::TierInsufficient => "TIER_INSUFFICIENT",
            DenialReason::LimitReached => "LIMIT_REACHED",
        }
    }
}

/// A business-rule denial with enough detail for the client to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub reason: DenialReason,
    pub feature: FeatureFlag,
    pub current_tier: TierId,
    /// Cheapest tier that grants the feature; `None` when no tier does.
    pub required_tier: Option<TierId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_count: Option<u64>,
}

impl Denial {
    pub fn message(&self) -> String {
        match (self.reason, &self.required_tier) {
            (DenialReason::TierInsufficient, Some(required)) => format!(
                "'{}' requires the {} plan or higher; you are on {}",
                self.feature, required, self.current_tier
            ),
            (DenialReason::TierInsufficient, None) => {
                format!("'{}' is not available on any plan", self.feature)
            }
            (DenialReason::LimitReached, required) => {
                let allowance = format!(
                    "Your {} plan allows {} {}",
                    self.current_tier,
                    self.limit.unwrap_or_default(),
                    self.resource
                        .as_ref()
                        .map(ResourceKind::as_str)
                        .unwrap_or("items")
                );
                match required {
                    Some(required) => format!("{}; remove one or upgrade to {} to add more", allowance, required),
                    None => format!("{}; remove one to add more", allowance),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied(Denial),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allowed)
    }
}

/// A quota slot taken by [`EntitlementResolver::admit`]; hand it back with
/// [`EntitlementResolver::release`] if the gated action did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub user: Uuid,
    pub resource: ResourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Granted(Option<Reservation>),
    Denied(Denial),
}

/// Faults that are not ordinary denials.
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error(transparent)]
    UnknownTier(#[from] UnknownTierError),

    #[error("User {0} does not exist")]
    UnknownUser(Uuid),

    #[error("Entitlement store failure: {0}")]
    Store(#[from] StoreError),
}

/// One resource row of an entitlement summary.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub resource: ResourceKind,
    pub limit: Limit,
    /// Present for counted resources only.
    pub used: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitlementSummary {
    pub tier: TierId,
    pub tier_name: String,
    pub features: Vec<FeatureFlag>,
    pub resources: Vec<ResourceUsage>,
}

/// Decides whether a user may exercise a feature.
///
/// The tier is read from the directory on every call, so a billing change is
/// visible to the very next request without a new session.
pub struct EntitlementResolver {
    catalog: Arc<TierCatalog>,
    users: Arc<dyn UserDirectory>,
    usage: Arc<dyn UsageCounters>,
}

impl EntitlementResolver {
    pub fn new(
        catalog: Arc<TierCatalog>,
        users: Arc<dyn UserDirectory>,
        usage: Arc<dyn UsageCounters>,
    ) -> Self {
        Self {
            catalog,
            users,
            usage,
        }
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Read-only decision. Does not touch counters.
    pub async fn check_access(
        &self,
        user: Uuid,
        feature: &FeatureFlag,
    ) -> Result<Access, EntitlementError> {
        let tier = self.resolve_tier(user).await?;
        if let Some(denial) = self.feature_denial(tier, feature) {
            return Ok(Access::Denied(denial));
        }

        if let Some(resource) = self.catalog.quota_for(feature) {
            if let Limit::Max(max) = tier.limit_for(resource) {
                let current = self.usage.current_count(user, resource).await?;
                if current >= max {
                    return Ok(Access::Denied(self.limit_denial(tier, feature, resource, max, current)));
                }
            }
        }

        Ok(Access::Allowed)
    }

    /// Check and, for count-limited features, claim a quota slot in one
    /// atomic step against the usage store.
    pub async fn admit(
        &self,
        user: Uuid,
        feature: &FeatureFlag,
    ) -> Result<Admission, EntitlementError> {
        let tier = self.resolve_tier(user).await?;
        if let Some(denial) = self.feature_denial(tier, feature) {
            return Ok(Admission::Denied(denial));
        }

        let Some(resource) = self.catalog.quota_for(feature) else {
            return Ok(Admission::Granted(None));
        };
        let reservation = Reservation {
            user,
            resource: resource.clone(),
        };

        match tier.limit_for(resource) {
            // Still counted so that a later downgrade sees the real total.
            Limit::Unlimited => {
                self.usage.increment(user, resource).await?;
                Ok(Admission::Granted(Some(reservation)))
            }
            Limit::Max(max) => match self.usage.try_increment(user, resource, max).await? {
                Some(_) => Ok(Admission::Granted(Some(reservation))),
                None => {
                    let current = self.usage.current_count(user, resource).await?;
                    Ok(Admission::Denied(self.limit_denial(tier, feature, resource, max, current)))
                }
            },
        }
    }

    pub async fn release(&self, reservation: &Reservation) -> Result<(), EntitlementError> {
        self.usage
            .decrement(reservation.user, &reservation.resource)
            .await?;
        Ok(())
    }

    /// The user's current ceiling for a resource such as `history_days`.
    pub async fn limit_of(&self, user: Uuid, resource: &ResourceKind) -> Result<Limit, EntitlementError> {
        Ok(self.resolve_tier(user).await?.limit_for(resource))
    }

    /// Tier, feature list and per-resource limits/usage for account pages.
    pub async fn summary(&self, user: Uuid) -> Result<EntitlementSummary, EntitlementError> {
        let tier = self.resolve_tier(user).await?;

        let counted = self.catalog.counted_resources();
        let mut resources: Vec<ResourceKind> = tier.limits.keys().cloned().collect();
        for resource in &counted {
            if !resources.contains(resource) {
                resources.push((*resource).clone());
            }
        }

        let mut rows = Vec::with_capacity(resources.len());
        for resource in resources {
            let used = if counted.contains(&resource) {
                Some(self.usage.current_count(user, &resource).await?)
            } else {
                None
            };
            rows.push(ResourceUsage {
                limit: tier.limit_for(&resource),
                resource,
                used,
            });
        }

        Ok(EntitlementSummary {
            tier: tier.id.clone(),
            tier_name: tier.display_name.clone(),
            features: tier.features.iter().cloned().collect(),
            resources: rows,
        })
    }

    async fn resolve_tier(&self, user: Uuid) -> Result<&Tier, EntitlementError> {
        let tier_id = self
            .users
            .tier_of(user)
            .await?
            .ok_or(EntitlementError::UnknownUser(user))?;

        self.catalog.tier(&tier_id).map_err(|err| {
            tracing::error!(user = %user, tier = %tier_id, "user references a tier missing from the catalog: {}", err);
            EntitlementError::UnknownTier(err)
        })
    }

    fn feature_denial(&self, tier: &Tier, feature: &FeatureFlag) -> Option<Denial> {
        if tier.has_feature(feature) {
            return None;
        }
        if !self.catalog.is_known(feature) {
            tracing::warn!(feature = %feature, "access check on unrecognized feature flag, denying");
        }
        Some(Denial {
            reason: DenialReason::TierInsufficient,
            feature: feature.clone(),
            current_tier: tier.id.clone(),
            required_tier: self.catalog.minimum_tier_for(feature).cloned(),
            resource: None,
            limit: None,
            current_count: None,
        })
    }

    /// `required_tier` is the cheapest tier with room for one more, or `None`
    /// when no tier would admit it.
    fn limit_denial(
        &self,
        tier: &Tier,
        feature: &FeatureFlag,
        resource: &ResourceKind,
        max: u64,
        current: u64,
    ) -> Denial {
        Denial {
            reason: DenialReason::LimitReached,
            feature: feature.clone(),
            current_tier: tier.id.clone(),
            required_tier: self
                .catalog
                .minimum_tier_with_room(feature, resource, current)
                .cloned(),
            resource: Some(resource.clone()),
            limit: Some(max),
            current_count: Some(current),
        }
    }
}
