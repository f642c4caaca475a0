use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::protected::{self, features};
use crate::handlers::public;
use crate::middleware::session_middleware;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(public::root::root))
        .route("/health", get(public::root::health))
        .route("/tiers", get(public::tiers::list))
        .route("/billing/webhook", post(public::billing::webhook))
        // Session
        .merge(account_routes())
        .merge(recipe_routes(&state))
        .merge(shopping_routes(&state))
        .merge(nutrition_routes(&state))
        .layer(middleware::from_fn_with_state(state.clone(), session_middleware))
        .with_state(state.clone());

    let router = if state.config.security.enable_cors {
        router.layer(cors_layer(&state.config.security.cors_origins))
    } else {
        router
    };

    if state.config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/me", get(protected::account::me))
        .route("/api/entitlements/:feature", get(protected::account::check))
}

fn recipe_routes(state: &AppState) -> Router<AppState> {
    let gate = &state.gate;

    Router::new()
        .route(
            "/api/recipes",
            get(protected::recipes::list).merge(gate.layer(
                post(protected::recipes::create),
                features::UPLOAD_RECIPES,
            )),
        )
        .route("/api/recipes/:id", delete(protected::recipes::delete))
}

fn shopping_routes(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/api/shopping-list",
        state.gate.layer(
            post(protected::shopping_list::generate),
            features::SHOPPING_LIST_GENERATION,
        ),
    )
}

fn nutrition_routes(state: &AppState) -> Router<AppState> {
    let gate = &state.gate;

    Router::new()
        .route(
            "/api/nutrition/logs",
            gate.layer(post(protected::nutrition::log), features::NUTRITION_TRACKING),
        )
        .route(
            "/api/nutrition/history",
            gate.layer(get(protected::nutrition::history), features::NUTRITION_TRACKING),
        )
        .route(
            "/api/nutrition/export",
            gate.layer(get(protected::nutrition::export), features::NUTRITION_ANALYSIS),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::{generate_jwt, Claims};
    use crate::config::AppConfig;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn gated_route_rejects_anonymous_before_the_body_is_read() {
        let app = app(AppState::in_memory(AppConfig::for_tests()).unwrap());

        let response = app
            .oneshot(
                Request::post("/api/recipes")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn listing_is_open_to_free_tier_while_upload_is_gated() {
        let state = AppState::in_memory(AppConfig::for_tests()).unwrap();
        let user = state.accounts.sign_up("router@example.com", None).await.unwrap();
        let token = generate_jwt(
            &Claims::new(user.id, &user.email, 1),
            &state.config.security.jwt_secret,
        )
        .unwrap();
        let app = app(state);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/recipes")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/nutrition/export")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "TIER_INSUFFICIENT");
    }
}
