//! Integration tests for the entitlement ledger.

mod helpers;

use chrono::{Duration, Utc};
use helpers::{TestApp, ADMIN_SESSION, USER_ID, USER_SESSION, WEBHOOK_SECRET};
use http::StatusCode;
use serde_json::json;

use access_gate::models::entitlement::{Entitlement, EntitlementSource, NewEntitlement};
use access_gate::repositories::entitlement::EntitlementStore;

async fn revoke(app: &TestApp, id: &str, reason: Option<&str>) -> helpers::TestResponse {
    app.request(
        "PATCH",
        &format!("/admin/entitlements/{}", id),
        Some(json!({ "status": "revoked", "reason": reason })),
        Some(ADMIN_SESSION),
    )
    .await
}

#[tokio::test]
async fn test_grant_revoke_regrant_end_to_end() {
    let app = TestApp::new().await;

    let first = app.grant(USER_ID, "learn-pr").await;
    assert!(app.user_has_access("learn-pr").await);

    let response = revoke(&app, &first, Some("refund")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "revoked");
    assert_eq!(response.body["revokedBy"], "user:1");
    assert!(!app.user_has_access("learn-pr").await);

    app.grant(USER_ID, "learn-pr").await;
    assert!(app.user_has_access("learn-pr").await);
}

#[tokio::test]
async fn test_grant_shape() {
    let app = TestApp::new().await;

    let response = app
        .request(
            "POST",
            "/admin/entitlements",
            Some(json!({ "userId": USER_ID, "appId": "learn-pr", "paymentReference": "pay_123" })),
            Some(ADMIN_SESSION),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["userId"], USER_ID);
    assert_eq!(response.body["appId"], "learn-pr");
    assert_eq!(response.body["status"], "active");
    assert_eq!(response.body["effectiveStatus"], "active");
    assert_eq!(response.body["source"], "admin");
    assert_eq!(response.body["paymentReference"], "pay_123");
    assert_eq!(response.body["grantedBy"], "user:1");

    let purchased: chrono::DateTime<Utc> = response.body["purchasedAt"].as_str().unwrap().parse().unwrap();
    let expires: chrono::DateTime<Utc> = response.body["expiresAt"].as_str().unwrap().parse().unwrap();
    assert_eq!(expires - purchased, Duration::days(365));
}

#[tokio::test]
async fn test_access_is_the_or_of_live_rows() {
    let app = TestApp::new().await;

    let revoked = app.grant(USER_ID, "learn-pr").await;
    revoke(&app, &revoked, None).await;
    assert!(!app.user_has_access("learn-pr").await);

    app.grant(USER_ID, "learn-pr").await;
    assert!(app.user_has_access("learn-pr").await);

    // Other apps and users are unaffected.
    assert!(!app.user_has_access("learn-ai").await);
    app.grant("43", "learn-sql").await;
    assert!(!app.user_has_access("learn-sql").await);
}

#[tokio::test]
async fn test_expired_rows_grant_nothing() {
    let app = TestApp::new().await;

    let lapsed = Entitlement::grant(
        NewEntitlement {
            user_id: USER_ID.to_string(),
            app_id: "learn-dsa".to_string(),
            source: EntitlementSource::PurchaseWebhook,
            payment_reference: Some("pay_old".to_string()),
            granted_by: "webhook:purchase".to_string(),
        },
        Utc::now() - Duration::days(366),
    );
    app.entitlements.insert(&lapsed).await.unwrap();

    assert!(!app.user_has_access("learn-dsa").await);

    let response = app
        .request(
            "GET",
            &format!("/admin/entitlements?userId={}", USER_ID),
            None,
            Some(ADMIN_SESSION),
        )
        .await;
    assert_eq!(response.body["entitlements"][0]["status"], "active");
    assert_eq!(response.body["entitlements"][0]["effectiveStatus"], "expired");
}

#[tokio::test]
async fn test_revocation_is_idempotent() {
    let app = TestApp::new().await;
    let id = app.grant(USER_ID, "learn-pr").await;

    let first = revoke(&app, &id, Some("chargeback")).await;
    let second = revoke(&app, &id, Some("duplicate click")).await;

    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["revokeReason"], "chargeback");
    assert_eq!(second.body["revokedAt"], first.body["revokedAt"]);
}

#[tokio::test]
async fn test_revoking_unknown_rows_is_not_found() {
    let app = TestApp::new().await;

    let response = revoke(&app, "6f1c1f64-8a53-4a43-9d0f-5a1b9c1e2d3f", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["kind"], "entitlement_not_found");
}

#[tokio::test]
async fn test_only_revocation_is_accepted() {
    let app = TestApp::new().await;
    let id = app.grant(USER_ID, "learn-pr").await;

    let response = app
        .request(
            "PATCH",
            &format!("/admin/entitlements/{}", id),
            Some(json!({ "status": "active" })),
            Some(ADMIN_SESSION),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.user_has_access("learn-pr").await);
}

#[tokio::test]
async fn test_grants_are_validated() {
    let app = TestApp::new().await;

    for body in [
        json!({ "userId": "", "appId": "learn-pr" }),
        json!({ "userId": USER_ID, "appId": "learn-cobol" }),
    ] {
        let response = app
            .request("POST", "/admin/entitlements", Some(body.clone()), Some(ADMIN_SESSION))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", body);
    }
}

#[tokio::test]
async fn test_ledger_endpoints_are_admin_only() {
    let app = TestApp::new().await;
    let body = json!({ "userId": USER_ID, "appId": "learn-pr" });

    let response = app
        .request("POST", "/admin/entitlements", Some(body), Some(USER_SESSION))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .request("GET", "/admin/entitlements?userId=42", None, Some(USER_SESSION))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    assert!(!app.user_has_access("learn-pr").await);
}

#[tokio::test]
async fn test_listing_is_newest_first() {
    let app = TestApp::new().await;

    for (app_id, days_ago) in [("learn-ai", 30), ("learn-pr", 10), ("learn-sql", 20)] {
        let row = Entitlement::grant(
            NewEntitlement {
                user_id: USER_ID.to_string(),
                app_id: app_id.to_string(),
                source: EntitlementSource::Admin,
                payment_reference: None,
                granted_by: "user:1".to_string(),
            },
            Utc::now() - Duration::days(days_ago),
        );
        app.entitlements.insert(&row).await.unwrap();
    }

    let response = app
        .request("GET", "/admin/entitlements?userId=42", None, Some(ADMIN_SESSION))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 3);
    let apps: Vec<&str> = response.body["entitlements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["appId"].as_str().unwrap())
        .collect();
    assert_eq!(apps, ["learn-pr", "learn-sql", "learn-ai"]);
}

#[tokio::test]
async fn test_stale_listings_are_superseded() {
    let app = TestApp::new().await;
    app.grant(USER_ID, "learn-pr").await;

    let response = app
        .request("GET", "/admin/entitlements?userId=42&seq=3", None, Some(ADMIN_SESSION))
        .await;
    assert_eq!(response.body["count"], 1);

    let response = app
        .request("GET", "/admin/entitlements?userId=7&seq=2", None, Some(ADMIN_SESSION))
        .await;
    assert_eq!(response.body["superseded"], true);
}

#[tokio::test]
async fn test_purchase_webhook_grants_access() {
    let app = TestApp::new().await;
    let event = json!({ "userId": USER_ID, "appId": "learn-ai", "paymentReference": "pay_789" });

    let response = app
        .request_with_headers(
            "POST",
            "/webhooks/purchase",
            Some(event.clone()),
            &[("x-webhook-secret", "wrong".to_string())],
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(!app.user_has_access("learn-ai").await);

    let response = app
        .request_with_headers("POST", "/webhooks/purchase", Some(event.clone()), &[])
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .request_with_headers(
            "POST",
            "/webhooks/purchase",
            Some(event),
            &[("x-webhook-secret", WEBHOOK_SECRET.to_string())],
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.body["entitlementId"].is_string());
    assert!(app.user_has_access("learn-ai").await);

    let listing = app
        .request("GET", "/admin/entitlements?userId=42", None, Some(ADMIN_SESSION))
        .await;
    assert_eq!(listing.body["entitlements"][0]["source"], "purchase_webhook");
    assert_eq!(listing.body["entitlements"][0]["grantedBy"], "webhook:purchase");
}

#[tokio::test]
async fn test_purchase_webhook_requires_a_payment_reference() {
    let app = TestApp::new().await;

    let response = app
        .request_with_headers(
            "POST",
            "/webhooks/purchase",
            Some(json!({ "userId": USER_ID, "appId": "learn-ai", "paymentReference": "" })),
            &[("x-webhook-secret", WEBHOOK_SECRET.to_string())],
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_purchase_webhook_is_closed_without_a_secret() {
    let app = TestApp::with_config(access_gate::Config::default()).await;

    let response = app
        .request_with_headers(
            "POST",
            "/webhooks/purchase",
            Some(json!({ "userId": USER_ID, "appId": "learn-ai", "paymentReference": "pay_1" })),
            &[("x-webhook-secret", String::new())],
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}
