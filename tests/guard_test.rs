//! Integration tests for guard evaluation and the guarded API surface.

mod helpers;

use access_gate::identity::fixed::ProbeScript;
use access_gate::identity::client::HealthReport;
use helpers::{TestApp, ADMIN_SESSION, USER_ID, USER_SESSION};
use http::StatusCode;

#[tokio::test]
async fn test_no_session_redirects_to_login_with_return_path() {
    let app = TestApp::new().await;

    for requirement in ["session", "admin", "entitlement&appId=learn-pr"] {
        let response = app
            .request(
                "GET",
                &format!("/guard/evaluate?requirement={}&path=/courses/learn-ai", requirement),
                None,
                None,
            )
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["decision"], "deny_redirect", "{}", requirement);
        assert_eq!(response.body["path"], "/login?redirect=%2Fcourses%2Flearn-ai");
    }
}

#[tokio::test]
async fn test_unknown_session_token_is_no_session() {
    let app = TestApp::new().await;

    let response = app
        .request("GET", "/guard/evaluate?requirement=session&path=/", None, Some("forged"))
        .await;

    assert_eq!(response.body["decision"], "deny_redirect");
}

#[tokio::test]
async fn test_signed_in_user_passes_session_guard() {
    let app = TestApp::new().await;

    let response = app
        .request("GET", "/guard/evaluate?requirement=session&path=/courses", None, Some(USER_SESSION))
        .await;

    assert_eq!(response.body, serde_json::json!({ "decision": "allow" }));
}

#[tokio::test]
async fn test_non_admin_never_allowed_on_admin_pages() {
    let app = TestApp::new().await;

    let response = app
        .request("GET", "/guard/evaluate?requirement=admin&path=/admin", None, Some(USER_SESSION))
        .await;

    assert_eq!(response.body["decision"], "deny_show");
    assert_eq!(response.body["message"], "Access Denied");
    assert_eq!(response.body["thenRedirectAfterMs"], 2000);
    assert_eq!(response.body["redirectTo"], "/");
}

#[tokio::test]
async fn test_admin_allowed_on_admin_pages() {
    let app = TestApp::new().await;

    let response = app
        .request("GET", "/guard/evaluate?requirement=admin&path=/admin", None, Some(ADMIN_SESSION))
        .await;

    assert_eq!(response.body["decision"], "allow");
}

#[tokio::test]
async fn test_role_revocation_applies_on_next_evaluation() {
    let app = TestApp::new().await;
    app.identity.set_admin(helpers::ADMIN_ID, false).await;

    let response = app
        .request("GET", "/guard/evaluate?requirement=admin&path=/admin", None, Some(ADMIN_SESSION))
        .await;

    assert_eq!(response.body["decision"], "deny_show");
}

#[tokio::test]
async fn test_identity_outage_fails_closed() {
    let app = TestApp::new().await;
    app.identity.set_unavailable(true).await;

    let response = app
        .request("GET", "/guard/evaluate?requirement=admin&path=/admin", None, Some(ADMIN_SESSION))
        .await;

    assert_eq!(response.body["decision"], "deny_redirect");
    assert_eq!(response.body["path"], "/login?redirect=%2Fadmin");
}

#[tokio::test]
async fn test_offsite_return_paths_are_replaced() {
    let app = TestApp::new().await;

    for path in ["//evil.example", "https://evil.example/x", "/\\evil.example", "javascript:alert(1)"] {
        let uri = format!(
            "/guard/evaluate?requirement=session&path={}",
            percent_encode(path)
        );
        let response = app.request("GET", &uri, None, None).await;
        assert_eq!(response.body["path"], "/login?redirect=%2F", "{}", path);
    }
}

fn percent_encode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

#[tokio::test]
async fn test_health_cookie_guard_outcomes() {
    let app = TestApp::new().await;
    let uri = "/guard/evaluate?requirement=admin_health_cookie&path=/admin/courses";

    let response = app.request("GET", uri, None, None).await;
    assert_eq!(response.body["decision"], "allow");

    app.health
        .set(ProbeScript::Respond(HealthReport { status: 401, needs_setup: false }))
        .await;
    let response = app.request("GET", uri, None, None).await;
    assert_eq!(response.body["path"], "/admin/login?redirect=%2Fadmin%2Fcourses");

    app.health
        .set(ProbeScript::Respond(HealthReport { status: 200, needs_setup: true }))
        .await;
    let response = app.request("GET", uri, None, None).await;
    assert_eq!(response.body["path"], "/admin/setup");

    app.health
        .set(ProbeScript::Respond(HealthReport { status: 500, needs_setup: false }))
        .await;
    let response = app.request("GET", uri, None, None).await;
    assert_eq!(response.body["decision"], "deny_redirect");
    assert_eq!(response.body["path"], "/admin/login?redirect=%2Fadmin%2Fcourses");

    app.health.set(ProbeScript::NoResponse).await;
    let response = app.request("GET", uri, None, None).await;
    assert_eq!(response.body["decision"], "deny_redirect");
}

#[tokio::test]
async fn test_setup_page_does_not_redirect_to_itself() {
    let app = TestApp::new().await;
    app.health
        .set(ProbeScript::Respond(HealthReport { status: 200, needs_setup: true }))
        .await;

    let response = app
        .request(
            "GET",
            "/guard/evaluate?requirement=admin_health_cookie&path=/admin/setup",
            None,
            None,
        )
        .await;

    assert_eq!(response.body["decision"], "allow");

    let response = app
        .request(
            "GET",
            "/guard/evaluate?requirement=admin_health_cookie&path=/admin/setupwizard",
            None,
            None,
        )
        .await;
    assert_eq!(response.body["decision"], "deny_redirect");
    assert_eq!(response.body["path"], "/admin/setup");
}

#[tokio::test]
async fn test_entitlement_guard_follows_the_ledger() {
    let app = TestApp::new().await;
    let uri = "/guard/evaluate?requirement=entitlement&appId=learn-pr&path=/apps/learn-pr";

    let response = app.request("GET", uri, None, Some(USER_SESSION)).await;
    assert_eq!(response.body["decision"], "deny_show");
    assert_eq!(response.body["message"], "Purchase required");

    let id = app.grant(USER_ID, "learn-pr").await;
    let response = app.request("GET", uri, None, Some(USER_SESSION)).await;
    assert_eq!(response.body["decision"], "allow");

    app.request(
        "PATCH",
        &format!("/admin/entitlements/{}", id),
        Some(serde_json::json!({ "status": "revoked" })),
        Some(ADMIN_SESSION),
    )
    .await;
    let response = app.request("GET", uri, None, Some(USER_SESSION)).await;
    assert_eq!(response.body["decision"], "deny_show");
}

#[tokio::test]
async fn test_bad_requirement_queries_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request("GET", "/guard/evaluate?requirement=everyone&path=/", None, None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request("GET", "/guard/evaluate?requirement=entitlement&path=/", None, None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .request("GET", "/guard/evaluate?requirement=entitlement&appId=nope&path=/", None, None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_evaluations_are_superseded() {
    let app = TestApp::new().await;
    let uri = |seq: u64| format!("/guard/evaluate?requirement=session&path=/courses&seq={}", seq);

    let response = app.request("GET", &uri(5), None, Some(USER_SESSION)).await;
    assert_eq!(response.body["decision"], "allow");

    let response = app.request("GET", &uri(4), None, Some(USER_SESSION)).await;
    assert_eq!(response.body["superseded"], true);
    assert_eq!(response.body["seq"], 4);

    // Another client's counter is independent.
    let response = app.request("GET", &uri(1), None, Some(ADMIN_SESSION)).await;
    assert_eq!(response.body["decision"], "allow");
}

#[tokio::test]
async fn test_unknown_sessions_are_not_sequenced() {
    let app = TestApp::new().await;

    for i in 0..200 {
        let response = app
            .request(
                "GET",
                &format!("/guard/evaluate?requirement=session&path=/p{}&seq=1", i),
                None,
                Some(&format!("bogus-{}", i)),
            )
            .await;
        assert_eq!(response.body["decision"], "deny_redirect");
    }
    assert!(app.state.sequencer.is_empty());

    app.request(
        "GET",
        "/guard/evaluate?requirement=session&path=/courses&seq=1",
        None,
        Some(USER_SESSION),
    )
    .await;
    assert_eq!(app.state.sequencer.len(), 1);
}

#[tokio::test]
async fn test_admin_api_denials_carry_the_decision() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/admin/otc", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["decision"], "deny_redirect");
    assert_eq!(response.body["path"], "/login?redirect=%2Fadmin%2Fotc");

    let response = app.request("GET", "/admin/otc", None, Some(USER_SESSION)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["decision"], "deny_show");

    let response = app.request("GET", "/admin/otc", None, Some(ADMIN_SESSION)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_cookie_mode_guards_admin_api_with_the_probe() {
    let app = TestApp::with_health_cookie_guard().await;

    let response = app.request("GET", "/admin/otc", None, None).await;
    assert_eq!(response.status, StatusCode::OK);

    app.health
        .set(ProbeScript::Respond(HealthReport { status: 401, needs_setup: false }))
        .await;
    let response = app.request("GET", "/admin/otc", None, Some(ADMIN_SESSION)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["path"], "/admin/login?redirect=%2Fadmin%2Fotc");
}

#[tokio::test]
async fn test_access_endpoint_requires_a_session() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/access/learn-pr", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    assert!(!app.user_has_access("learn-pr").await);
}

#[tokio::test]
async fn test_health_endpoint_is_open() {
    let app = TestApp::new().await;

    let response = app.request("GET", "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}
