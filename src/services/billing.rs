//! Subscription lifecycle events from the billing provider.
//!
//! Events follow the Stripe webhook shape: `{"type": ..., "data": {"object": ...}}`
//! where the object for `customer.subscription.*` events is a subscription and
//! for `checkout.session.completed` a checkout session. Only the fields needed
//! to pick a tier are read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use super::accounts::{AccountError, AccountService};
use crate::database::models::{SubscriptionStatus, TierChange, UserRecord};
use crate::entitlements::TierId;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Webhook secret is not configured")]
    NotConfigured,
    #[error("Webhook secret mismatch")]
    BadSecret,
    #[error("Malformed {kind} payload: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Account(#[from] AccountError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct Subscription {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    status: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionItem {
    price: Price,
}

#[derive(Debug, Clone, Deserialize)]
struct Price {
    id: String,
}

impl Subscription {
    fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    /// Only present when the session was fetched with line items expanded.
    #[serde(default)]
    line_items: SubscriptionItems,
}

#[derive(Debug, Clone, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

impl CheckoutSession {
    fn price_id(&self) -> Option<&str> {
        self.line_items
            .data
            .first()
            .map(|item| item.price.id.as_str())
            .or_else(|| self.metadata.get("price_id").map(String::as_str))
    }

    fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|details| details.email.as_deref())
            .or(self.customer_email.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BillingOutcome {
    Applied {
        user: Uuid,
        tier: TierId,
        status: SubscriptionStatus,
    },
    Ignored {
        reason: String,
    },
}

impl BillingOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        BillingOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct BillingService {
    accounts: AccountService,
    price_tiers: HashMap<String, TierId>,
    secret_digest: Option<[u8; 32]>,
}

impl BillingService {
    pub fn new(
        accounts: AccountService,
        price_tiers: &HashMap<String, String>,
        webhook_secret: Option<&str>,
    ) -> Self {
        Self {
            accounts,
            price_tiers: price_tiers
                .iter()
                .map(|(price, tier)| (price.clone(), TierId::new(tier)))
                .collect(),
            secret_digest: webhook_secret.map(digest),
        }
    }

    /// Compare the presented secret with the configured one via SHA-256
    /// digests so the comparison does not depend on secret length.
    pub fn verify_secret(&self, presented: Option<&str>) -> Result<(), BillingError> {
        let expected = self.secret_digest.ok_or(BillingError::NotConfigured)?;
        let presented = presented.ok_or(BillingError::BadSecret)?;

        let actual = digest(presented);
        let diff = expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(BillingError::BadSecret)
        }
    }

    /// Tier a price id buys. Unknown prices fall back to the default tier.
    pub fn tier_for_price(&self, price_id: Option<&str>) -> TierId {
        price_id
            .and_then(|price| self.price_tiers.get(price))
            .cloned()
            .unwrap_or_else(|| self.accounts.catalog().default_tier().clone())
    }

    pub async fn apply_event(&self, event: &WebhookEvent) -> Result<BillingOutcome, BillingError> {
        match event.kind.as_str() {
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.apply_subscription(event, false).await
            }
            "customer.subscription.deleted" => self.apply_subscription(event, true).await,
            "checkout.session.completed" => self.apply_checkout(event).await,
            other => {
                tracing::debug!(event = ?event.id, kind = other, "ignoring billing event");
                Ok(BillingOutcome::ignored(format!("unhandled event type {}", other)))
            }
        }
    }

    async fn apply_subscription(&self, event: &WebhookEvent, deleted: bool) -> Result<BillingOutcome, BillingError> {
        let subscription: Subscription = parse_object(event)?;

        let Some(user) = self.resolve_user(&subscription).await? else {
            tracing::warn!(
                event = ?event.id,
                subscription = %subscription.id,
                customer = ?subscription.customer,
                "billing event for unknown user"
            );
            return Ok(BillingOutcome::ignored("no matching user"));
        };

        let (tier, status) = self.target(&user, &subscription, deleted);
        let change = TierChange {
            tier,
            subscription_status: status,
            stripe_customer_id: subscription.customer.clone(),
            stripe_subscription_id: Some(subscription.id.clone()),
        };

        let updated = self.accounts.change_tier(user.id, change).await?;
        Ok(BillingOutcome::Applied {
            user: updated.id,
            tier: updated.tier,
            status: updated.subscription_status,
        })
    }

    /// A completed checkout grants the purchased tier straight away and
    /// records the customer id so later subscription events find the user.
    async fn apply_checkout(&self, event: &WebhookEvent) -> Result<BillingOutcome, BillingError> {
        let session: CheckoutSession = parse_object(event)?;

        let Some(user) = self.resolve_checkout_user(&session).await? else {
            tracing::warn!(
                event = ?event.id,
                session = %session.id,
                customer = ?session.customer,
                "checkout completed for unknown user"
            );
            return Ok(BillingOutcome::ignored("no matching user"));
        };

        let Some(tier) = self.checkout_tier(&session) else {
            return Ok(BillingOutcome::ignored("no paid tier to grant"));
        };

        tracing::info!(user = %user.id, session = %session.id, tier = %tier, "checkout completed");
        let change = TierChange {
            tier,
            subscription_status: SubscriptionStatus::Active,
            stripe_customer_id: session.customer.clone(),
            stripe_subscription_id: session.subscription.clone(),
        };

        let updated = self.accounts.change_tier(user.id, change).await?;
        Ok(BillingOutcome::Applied {
            user: updated.id,
            tier: updated.tier,
            status: updated.subscription_status,
        })
    }

    async fn resolve_user(&self, subscription: &Subscription) -> Result<Option<UserRecord>, BillingError> {
        if let Some(user) = self.user_by_id(subscription.metadata.get("user_id")).await? {
            return Ok(Some(user));
        }

        match &subscription.customer {
            Some(customer) => Ok(self.accounts.find_by_customer(customer).await?),
            None => Ok(None),
        }
    }

    /// Metadata user id, then the client reference, then the customer id,
    /// then the email entered at checkout.
    async fn resolve_checkout_user(&self, session: &CheckoutSession) -> Result<Option<UserRecord>, BillingError> {
        for raw in [session.metadata.get("user_id"), session.client_reference_id.as_ref()] {
            if let Some(user) = self.user_by_id(raw).await? {
                return Ok(Some(user));
            }
        }

        if let Some(customer) = &session.customer {
            if let Some(user) = self.accounts.find_by_customer(customer).await? {
                return Ok(Some(user));
            }
        }

        match session.email() {
            Some(email) => Ok(self.accounts.find_by_email(email).await?),
            None => Ok(None),
        }
    }

    async fn user_by_id(&self, raw: Option<&String>) -> Result<Option<UserRecord>, BillingError> {
        let Some(id) = raw.and_then(|raw| Uuid::parse_str(raw).ok()) else {
            return Ok(None);
        };
        match self.accounts.find(id).await {
            Ok(user) => Ok(Some(user)),
            Err(AccountError::UserNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// A configured price wins, then a `tier` named in the session metadata.
    /// Without either the buyer gets the first tier above the default one.
    fn checkout_tier(&self, session: &CheckoutSession) -> Option<TierId> {
        if let Some(tier) = session.price_id().and_then(|price| self.price_tiers.get(price)) {
            return Some(tier.clone());
        }

        let catalog = self.accounts.catalog();
        if let Some(tier) = session.metadata.get("tier").map(TierId::new) {
            if catalog.contains(&tier) {
                return Some(tier);
            }
        }
        catalog.next_tier_above(catalog.default_tier()).cloned()
    }

    fn target(&self, user: &UserRecord, subscription: &Subscription, deleted: bool) -> (TierId, SubscriptionStatus) {
        let default_tier = self.accounts.catalog().default_tier().clone();
        if deleted {
            return (default_tier, SubscriptionStatus::Canceled);
        }

        match subscription.status.as_str() {
            "active" => (self.tier_for_price(subscription.price_id()), SubscriptionStatus::Active),
            "trialing" => (self.tier_for_price(subscription.price_id()), SubscriptionStatus::Trialing),
            // Grace period: keep what they have while payment is retried.
            "past_due" => (user.tier.clone(), SubscriptionStatus::PastDue),
            "unpaid" => (default_tier, SubscriptionStatus::Unpaid),
            "canceled" | "incomplete_expired" => (default_tier, SubscriptionStatus::Canceled),
            other => {
                tracing::info!(user = %user.id, status = other, "subscription not yet active, tier unchanged");
                (user.tier.clone(), SubscriptionStatus::Inactive)
            }
        }
    }
}

fn parse_object<T: DeserializeOwned>(event: &WebhookEvent) -> Result<T, BillingError> {
    serde_json::from_value(event.data.object.clone()).map_err(|source| BillingError::Malformed {
        kind: event.kind.clone(),
        source,
    })
}

fn digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}
