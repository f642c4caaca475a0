mod common;

use anyhow::Result;
use common::{subscription_event, WEBHOOK_SECRET};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn free_tier_stops_at_recipe_limit() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("free@example.com").await?;

    for n in 0..10 {
        let res = server.save_recipe(&user, &format!("Bread {}", n)).await?;
        assert_eq!(res.status(), StatusCode::CREATED, "recipe {} should save", n);
    }

    let res = server.save_recipe(&user, "One too many").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "LIMIT_REACHED");
    assert_eq!(body["limit"], 10);
    assert_eq!(body["current_count"], 10);
    assert_eq!(body["current_tier"], "free");
    assert_eq!(body["required_tier"], "home");

    let list: Value = server
        .client
        .get(server.url("/api/recipes"))
        .bearer_auth(&user.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(list["data"].as_array().map(Vec::len), Some(10));
    Ok(())
}

#[tokio::test]
async fn deleting_a_recipe_frees_a_slot() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("tidy@example.com").await?;

    let mut last_id = String::new();
    for n in 0..10 {
        let body: Value = server.save_recipe(&user, &format!("Soup {}", n)).await?.json().await?;
        last_id = body["data"]["id"].as_str().unwrap_or_default().to_string();
    }
    assert_eq!(server.save_recipe(&user, "blocked").await?.status(), StatusCode::FORBIDDEN);

    let res = server
        .client
        .delete(server.url(&format!("/api/recipes/{}", last_id)))
        .bearer_auth(&user.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(server.save_recipe(&user, "fits again").await?.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn rejected_body_does_not_consume_quota() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("typo@example.com").await?;

    let res = server
        .client
        .post(server.url("/api/recipes"))
        .bearer_auth(&user.token)
        .json(&json!({ "title": "   " }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let me: Value = server
        .client
        .get(server.url("/api/me"))
        .bearer_auth(&user.token)
        .send()
        .await?
        .json()
        .await?;
    let used = me["data"]["resources"]
        .as_array()
        .and_then(|rows| rows.iter().find(|r| r["resource"] == "saved_recipes"))
        .map(|r| r["used"].clone());
    assert_eq!(used, Some(json!(0)));
    Ok(())
}

#[tokio::test]
async fn private_recipes_need_home() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("secret@example.com").await?;

    let res = server
        .client
        .post(server.url("/api/recipes"))
        .bearer_auth(&user.token)
        .json(&json!({ "title": "Family stew", "is_private": true }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "TIER_INSUFFICIENT");
    assert_eq!(body["required_tier"], "home");
    Ok(())
}

#[tokio::test]
async fn gated_features_are_tier_insufficient_on_free() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("basic@example.com").await?;

    let res = server
        .client
        .post(server.url("/api/shopping-list"))
        .bearer_auth(&user.token)
        .json(&json!({}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "TIER_INSUFFICIENT");
    assert_eq!(body["feature"], "shopping_list_generation");
    assert_eq!(body["required_tier"], "home");

    let res = server
        .client
        .get(server.url("/api/nutrition/export"))
        .bearer_auth(&user.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["feature"], "nutrition_analysis");
    Ok(())
}

#[tokio::test]
async fn entitlement_check_endpoint_reports_without_consuming() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("curious@example.com").await?;

    let body: Value = server
        .client
        .get(server.url("/api/entitlements/upload_recipes"))
        .bearer_auth(&user.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["allowed"], true);

    let body: Value = server
        .client
        .get(server.url("/api/entitlements/barcode_scanning"))
        .bearer_auth(&user.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["data"]["allowed"], false);
    assert_eq!(body["data"]["denial"]["required_tier"], "pro");
    Ok(())
}

#[tokio::test]
async fn anonymous_upload_is_unauthenticated_not_forbidden() -> Result<()> {
    let server = common::TestServer::start().await?;

    let res = server
        .client
        .post(server.url("/api/recipes"))
        .json(&json!({ "title": "Ghost toast" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn private_recipes_do_not_fill_free_slots_after_downgrade() -> Result<()> {
    let server = common::TestServer::start().await?;
    let user = server.sign_up("hoarder@example.com").await?;

    server
        .send_webhook(
            WEBHOOK_SECRET,
            subscription_event("customer.subscription.created", user.id, "active", "price_home_monthly"),
        )
        .await?;
    for n in 0..4 {
        let res = server
            .client
            .post(server.url("/api/recipes"))
            .bearer_auth(&user.token)
            .json(&json!({ "title": format!("Secret {}", n), "is_private": true }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED);
    }
    for n in 0..2 {
        assert_eq!(server.save_recipe(&user, &format!("Shared {}", n)).await?.status(), StatusCode::CREATED);
    }

    server
        .send_webhook(
            WEBHOOK_SECRET,
            subscription_event("customer.subscription.deleted", user.id, "canceled", "price_home_monthly"),
        )
        .await?;

    // Two public recipes leave eight of the ten free slots.
    for n in 0..8 {
        assert_eq!(server.save_recipe(&user, &format!("Free {}", n)).await?.status(), StatusCode::CREATED);
    }
    let res = server.save_recipe(&user, "Free 9").await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["current_count"], 10);

    let (before, after) = server.state.accounts.reconcile_usage(user.id).await?;
    assert_eq!((before, after), (10, 10));
    Ok(())
}
