//! Feature gating for request handlers.
//!
//! [`RequestGate::guard`] wraps any async handler: it refuses anonymous
//! callers before consulting the resolver, turns denials into
//! [`GateRejection`]s, and otherwise runs the handler and returns its output
//! untouched. A quota slot claimed on the way in is handed back if the
//! handler's [`Outcome`] reports failure.
//!
//! [`gate_middleware`] adapts the same guard to axum's middleware stack.

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use std::future::Future;
use std::sync::Arc;

use super::session::{AuthUser, RequestContext};
use crate::entitlements::{Admission, Denial, EntitlementError, EntitlementResolver, FeatureFlag};
use crate::error::ApiError;

/// Whether a gated handler completed the action it was admitted for.
pub trait Outcome {
    fn succeeded(&self) -> bool;
}

impl<T, E> Outcome for Result<T, E> {
    fn succeeded(&self) -> bool {
        self.is_ok()
    }
}

impl Outcome for Response {
    fn succeeded(&self) -> bool {
        let status = self.status();
        !(status.is_client_error() || status.is_server_error())
    }
}

#[derive(Debug)]
pub enum GateRejection {
    Unauthenticated,
    Denied(Denial),
    Fault(EntitlementError),
}

impl From<GateRejection> for ApiError {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::Unauthenticated => ApiError::unauthenticated("Sign in to continue"),
            GateRejection::Denied(denial) => ApiError::from(denial),
            GateRejection::Fault(err) => ApiError::from(err),
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[derive(Clone)]
pub struct RequestGate {
    resolver: Arc<EntitlementResolver>,
}

impl RequestGate {
    pub fn new(resolver: Arc<EntitlementResolver>) -> Self {
        Self { resolver }
    }

    pub async fn guard<F, Fut, O>(
        &self,
        ctx: &RequestContext,
        feature: &FeatureFlag,
        handler: F,
    ) -> Result<O, GateRejection>
    where
        F: FnOnce(AuthUser) -> Fut,
        Fut: Future<Output = O>,
        O: Outcome,
    {
        let Some(user) = ctx.user.clone() else {
            return Err(GateRejection::Unauthenticated);
        };

        let reservation = match self.resolver.admit(user.id, feature).await {
            Ok(Admission::Granted(reservation)) => reservation,
            Ok(Admission::Denied(denial)) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    user = %user.id,
                    feature = %feature,
                    reason = denial.reason.code(),
                    "entitlement denied"
                );
                return Err(GateRejection::Denied(denial));
            }
            Err(err) => return Err(GateRejection::Fault(err)),
        };

        let outcome = handler(user).await;

        if let Some(reservation) = reservation.filter(|_| !outcome.succeeded()) {
            if let Err(err) = self.resolver.release(&reservation).await {
                tracing::error!(
                    request_id = %ctx.request_id,
                    user = %reservation.user,
                    resource = %reservation.resource,
                    "failed to release quota reservation: {}",
                    err
                );
            }
        }

        Ok(outcome)
    }

    /// Attach this gate for `feature` to a single route.
    pub fn layer<S>(&self, route: MethodRouter<S>, feature: &str) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let state = FeatureGate {
            gate: self.clone(),
            feature: FeatureFlag::new(feature),
        };
        route.route_layer(middleware::from_fn_with_state(state, gate_middleware))
    }
}

/// Middleware state: the gate plus the flag a route requires.
#[derive(Clone)]
pub struct FeatureGate {
    pub gate: RequestGate,
    pub feature: FeatureFlag,
}

pub async fn gate_middleware(
    State(FeatureGate { gate, feature }): State<FeatureGate>,
    request: Request,
    next: Next,
) -> Response {
    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(RequestContext::anonymous);

    match gate.guard(&ctx, &feature, move |_user| next.run(request)).await {
        Ok(response) => response,
        Err(rejection) => rejection.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NewUser, TierChange, UserRecord};
    use crate::entitlements::{
        DenialReason, MemoryUsageCounters, ResourceKind, TierCatalog, TierId, UsageCounters,
    };
    use crate::store::memory::MemoryUserDirectory;
    use crate::store::{StoreError, UserDirectory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const CATALOG: &str = r#"
version: "gate-test"
default_tier: free
tiers:
  free:
    rank: 0
    features: [upload_recipes, search]
    limits:
      saved_recipes: 5
  home:
    rank: 1
    inherits: free
    features: [private_recipes]
quotas:
  upload_recipes: saved_recipes
"#;

    /// Directory wrapper that counts lookups.
    struct CountingDirectory {
        inner: MemoryUserDirectory,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl UserDirectory for CountingDirectory {
        async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, StoreError> {
            self.inner.create_user(new_user).await
        }
        async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_user(id).await
        }
        async fn find_by_customer(&self, customer_id: &str) -> Result<Option<UserRecord>, StoreError> {
            self.inner.find_by_customer(customer_id).await
        }
        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
            self.inner.find_by_email(email).await
        }
        async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
            self.inner.list_users().await
        }
        async fn set_tier(&self, id: Uuid, change: &TierChange) -> Result<UserRecord, StoreError> {
            self.inner.set_tier(id, change).await
        }
    }

    struct Fixture {
        gate: RequestGate,
        users: Arc<CountingDirectory>,
        usage: Arc<MemoryUsageCounters>,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(TierCatalog::from_yaml_str(CATALOG).unwrap());
        let users = Arc::new(CountingDirectory {
            inner: MemoryUserDirectory::new(),
            lookups: AtomicUsize::new(0),
        });
        let usage = Arc::new(MemoryUsageCounters::new());
        let resolver = Arc::new(EntitlementResolver::new(catalog, users.clone(), usage.clone()));
        Fixture {
            gate: RequestGate::new(resolver),
            users,
            usage,
        }
    }

    async fn signed_in(fx: &Fixture, tier: &str) -> RequestContext {
        let user = fx
            .users
            .create_user(NewUser {
                email: format!("{}@example.com", Uuid::new_v4()),
                display_name: None,
                tier: TierId::new(tier),
            })
            .await
            .unwrap();
        RequestContext::for_user(AuthUser {
            id: user.id,
            email: user.email,
        })
    }

    fn recipes() -> ResourceKind {
        ResourceKind::new("saved_recipes")
    }

    #[tokio::test]
    async fn anonymous_caller_never_reaches_resolver() {
        let fx = fixture();
        let ran = AtomicUsize::new(0);

        let result = fx
            .gate
            .guard(&RequestContext::anonymous(), &"search".into(), |_| async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            })
            .await;

        assert!(matches!(result, Err(GateRejection::Unauthenticated)));
        assert_eq!(fx.users.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allowed_handler_output_passes_through() {
        let fx = fixture();
        let ctx = signed_in(&fx, "free").await;
        let expected = ctx.user.clone().unwrap();

        let result = fx
            .gate
            .guard(&ctx, &"search".into(), |user| async move { Ok::<_, ()>(user) })
            .await
            .unwrap();

        assert_eq!(result, Ok(expected));
    }

    #[tokio::test]
    async fn denied_handler_is_not_invoked() {
        let fx = fixture();
        let ctx = signed_in(&fx, "free").await;
        let ran = AtomicUsize::new(0);

        let result = fx
            .gate
            .guard(&ctx, &"private_recipes".into(), |_| async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            })
            .await;

        let Err(GateRejection::Denied(denial)) = result else { panic!("expected denial") };
        assert_eq!(denial.reason, DenialReason::TierInsufficient);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_handler_releases_its_slot() {
        let fx = fixture();
        let ctx = signed_in(&fx, "free").await;
        let user = ctx.user.as_ref().unwrap().id;

        let result = fx
            .gate
            .guard(&ctx, &"upload_recipes".into(), |_| async { Err::<(), _>("insert failed") })
            .await
            .unwrap();

        assert!(result.is_err());
        assert_eq!(fx.usage.current_count(user, &recipes()).await.unwrap(), 0);

        fx.gate
            .guard(&ctx, &"upload_recipes".into(), |_| async { Ok::<_, ()>(()) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fx.usage.current_count(user, &recipes()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn racing_for_last_slot_admits_exactly_one() {
        let fx = fixture();
        let ctx = signed_in(&fx, "free").await;
        let user = ctx.user.as_ref().unwrap().id;
        fx.usage.reset(user, &recipes(), 4).await.unwrap();

        let feature = FeatureFlag::new("upload_recipes");
        let attempts = (0..8).map(|_| {
            fx.gate
                .guard(&ctx, &feature, |_| async { Ok::<_, ()>(()) })
        });
        let results = futures::future::join_all(attempts).await;

        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let limited = results
            .iter()
            .filter(|r| {
                matches!(r, Err(GateRejection::Denied(d)) if d.reason == DenialReason::LimitReached)
            })
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(limited, 7);
        assert_eq!(fx.usage.current_count(user, &recipes()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn session_for_deleted_account_is_a_fault_not_a_pass() {
        let fx = fixture();
        let ctx = RequestContext::for_user(AuthUser {
            id: Uuid::new_v4(),
            email: "ghost@example.com".into(),
        });

        let result = fx
            .gate
            .guard(&ctx, &"search".into(), |_| async { Ok::<_, ()>(()) })
            .await;
        let Err(GateRejection::Fault(err)) = result else { panic!("expected fault") };
        assert_eq!(ApiError::from(err).status_code(), 401);
    }
}
