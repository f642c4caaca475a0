#![allow(dead_code)]

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use homegrub_api::auth::{generate_jwt, Claims};
use homegrub_api::config::AppConfig;
use homegrub_api::AppState;

pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// In-process server on memory storage. Each test gets its own so counters
    /// and accounts never leak between tests.
    pub async fn start() -> Result<Self> {
        let mut config = AppConfig::for_tests();
        config.api.enable_request_logging = false;
        config.billing.price_tiers = [
            ("price_home_monthly", "home"),
            ("price_family_monthly", "family"),
            ("price_pro_monthly", "pro"),
        ]
        .into_iter()
        .map(|(price, tier)| (price.to_string(), tier.to_string()))
        .collect();

        let state = AppState::in_memory(config)?;

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test port")?;
        let app = homegrub_api::app(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            port,
            base_url,
            state,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create an account on the default tier and a session token for it.
    pub async fn sign_up(&self, email: &str) -> Result<TestUser> {
        let user = self.state.accounts.sign_up(email, None).await?;
        let secret = &self.state.config.security.jwt_secret;
        let token = generate_jwt(&Claims::new(user.id, &user.email, 1), secret)?;
        Ok(TestUser { id: user.id, token })
    }

    pub async fn save_recipe(&self, user: &TestUser, title: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/api/recipes"))
            .bearer_auth(&user.token)
            .json(&json!({ "title": title, "ingredients": ["flour", "water"] }))
            .send()
            .await?)
    }

    pub async fn send_webhook(&self, secret: &str, event: Value) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url("/billing/webhook"))
            .header("x-webhook-secret", secret)
            .json(&event)
            .send()
            .await?)
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

pub fn subscription_event(kind: &str, user: Uuid, status: &str, price: &str) -> Value {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": kind,
        "data": {
            "object": {
                "id": "sub_123",
                "customer": "cus_123",
                "status": status,
                "metadata": { "user_id": user.to_string() },
                "items": { "data": [ { "price": { "id": price } } ] }
            }
        }
    })
}
