mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn health_reports_memory_backend() -> Result<()> {
    let server = common::TestServer::start().await?;

    let res = server.client.get(server.url("/health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["database"], "memory");
    Ok(())
}

#[tokio::test]
async fn root_lists_endpoints() -> Result<()> {
    let server = common::TestServer::start().await?;

    let body: Value = server.client.get(server.url("/")).send().await?.json().await?;
    assert_eq!(body["data"]["name"], "HomeGrub API");
    assert!(body["data"]["endpoints"]["tiers"].is_string());
    Ok(())
}

#[tokio::test]
async fn tiers_are_published_cheapest_first() -> Result<()> {
    let server = common::TestServer::start().await?;

    let body: Value = server.client.get(server.url("/tiers")).send().await?.json().await?;
    assert_eq!(body["data"]["default_tier"], "free");

    let tiers = body["data"]["tiers"].as_array().cloned().unwrap_or_default();
    let ranks: Vec<u64> = tiers.iter().filter_map(|t| t["rank"].as_u64()).collect();
    assert_eq!(ranks.len(), tiers.len());
    assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "ranks out of order: {:?}", ranks);
    assert_eq!(tiers[0]["id"], "free");
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_session() -> Result<()> {
    let server = common::TestServer::start().await?;

    let res = server.client.get(server.url("/api/me")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let res = server
        .client
        .get(server.url("/api/me"))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn me_reports_tier_and_usage() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("cook@example.com").await?;

    let body: Value = server
        .client
        .get(server.url("/api/me"))
        .bearer_auth(&user.token)
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["data"]["email"], "cook@example.com");
    assert_eq!(body["data"]["tier"], "free");
    let resources = body["data"]["resources"].as_array().cloned().unwrap_or_default();
    let saved = resources
        .iter()
        .find(|r| r["resource"] == "saved_recipes")
        .cloned()
        .unwrap_or_default();
    assert_eq!(saved["used"], 0);
    Ok(())
}
