mod common;

use std::net::Ipv4Addr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ipnet::Ipv4Net;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{json_request, setup_app, setup_app_with, DEFAULT_START};

// -- Helpers ------------------------------------------------------------------

/// Creates an account and logs in. Returns (account_number, access_token).
async fn create_account_and_login(app: &axum::Router) -> (String, String) {
    let (status, body) = json_request(app, "POST", "/accounts/v1/accounts", None, None).await;
    assert_eq!(status, StatusCode::CREATED);
    let number = body["number"].as_str().unwrap().to_string();

    let (status, body) = json_request(
        app,
        "POST",
        "/auth/v1/token",
        None,
        Some(json!({ "account_number": number })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap().to_string();
    (number, token)
}

async fn add_device(app: &axum::Router, token: &str, pubkey: &str) -> (StatusCode, Value) {
    json_request(
        app,
        "POST",
        "/accounts/v1/devices",
        Some(token),
        Some(json!({ "pubkey": pubkey, "hijack_dns": false })),
    )
    .await
}

fn host(cidr: &Value) -> Ipv4Addr {
    cidr.as_str()
        .unwrap()
        .strip_suffix("/32")
        .unwrap()
        .parse()
        .unwrap()
}

fn assert_timestamp_format(ts: &str) {
    // 2023-11-19T21:33:41+00:00
    assert_eq!(ts.len(), 25, "{ts}");
    assert!(ts.ends_with("+00:00"), "{ts}");
    assert!(!ts.contains('.'), "{ts}");
    assert_eq!(&ts[10..11], "T");
}

// -- Accounts & tokens --------------------------------------------------------

#[tokio::test]
async fn test_create_account() {
    let (app, _) = setup_app().await;

    let (status, body) = json_request(&app, "POST", "/accounts/v1/accounts", None, None).await;
    assert_eq!(status, StatusCode::CREATED);

    let number = body["number"].as_str().unwrap();
    assert_eq!(number.len(), 16);
    assert!(number.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(body["max_devices"], 5);
    assert_eq!(body["can_add_devices"], true);
    assert_eq!(body["max_ports"], 0);
    assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
    assert_timestamp_format(body["expiry"].as_str().unwrap());
}

#[tokio::test]
async fn test_token_for_existing_account() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    assert!(token.starts_with("mva_"));
    assert_eq!(token.len(), 68);
}

#[tokio::test]
async fn test_token_expiry_format() {
    let (app, _) = setup_app().await;
    let (status, body) = json_request(&app, "POST", "/accounts/v1/accounts", None, None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = json_request(
        &app,
        "POST",
        "/auth/v1/token",
        None,
        Some(json!({ "account_number": body["number"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_timestamp_format(body["expiry"].as_str().unwrap());
}

#[tokio::test]
async fn test_token_for_unknown_account_rejected() {
    let (app, _) = setup_app().await;

    let (status, _) = json_request(
        &app,
        "POST",
        "/auth/v1/token",
        None,
        Some(json!({ "account_number": "1111222233334444" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_request(
        &app,
        "POST",
        "/auth/v1/token",
        None,
        Some(json!({ "account_number": "not-a-number" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_ascii_account_number_rejected() {
    let (app, _) = setup_app().await;

    let (status, body) = json_request(
        &app,
        "POST",
        "/auth/v1/token",
        None,
        Some(json!({ "account_number": "1234567é89" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_missing_bearer_token_rejected() {
    let (app, _) = setup_app().await;
    let (status, _) = json_request(&app, "GET", "/accounts/v1/accounts/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_bearer_token_forbidden() {
    let (app, _) = setup_app().await;

    let unknown = "mva_0000000000000000000000000000000000000000000000000000000000000000";
    let (status, body) =
        json_request(&app, "GET", "/accounts/v1/accounts/me", Some(unknown), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "INVALID_ACCESS_TOKEN");

    let (status, _) =
        json_request(&app, "GET", "/accounts/v1/accounts/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_new_token_revokes_previous() {
    let (app, _) = setup_app().await;
    let (number, old_token) = create_account_and_login(&app).await;

    let (status, body) = json_request(
        &app,
        "POST",
        "/auth/v1/token",
        None,
        Some(json!({ "account_number": number })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_token = body["access_token"].as_str().unwrap();
    assert_ne!(new_token, old_token);

    let (status, _) =
        json_request(&app, "GET", "/accounts/v1/accounts/me", Some(&old_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) =
        json_request(&app, "GET", "/accounts/v1/accounts/me", Some(new_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_account_me() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    let (status, body) =
        json_request(&app, "GET", "/accounts/v1/accounts/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_devices"], 5);
    assert_eq!(body["can_add_devices"], true);
    assert!(body.get("number").is_none());
    assert_timestamp_format(body["expiry"].as_str().unwrap());
}

#[tokio::test]
async fn test_www_auth_token() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    let (status, body) =
        json_request(&app, "POST", "/app/v1/www-auth-token", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auth_token"].as_str().unwrap().len(), 32);

    let (status, _) = json_request(&app, "POST", "/app/v1/www-auth-token", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Devices ------------------------------------------------------------------

#[tokio::test]
async fn test_device_lifecycle_frees_address() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;
    let subnet: Ipv4Net = "10.64.0.0/10".parse().unwrap();

    let (status, first) = add_device(&app, &token, "abc").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["pubkey"], "abc");
    assert_eq!(first["hijack_dns"], false);
    assert_eq!(first["ports"], json!([]));
    assert_eq!(first["name"].as_str().unwrap().split(' ').count(), 2);
    let first_ip = host(&first["ipv4_address"]);
    assert!(subnet.contains(&first_ip));
    assert_eq!(first_ip, DEFAULT_START.parse::<Ipv4Addr>().unwrap());
    assert!(first["ipv6_address"].as_str().unwrap().ends_with("/128"));

    let (status, second) = add_device(&app, &token, "def").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(host(&second["ipv4_address"]), Ipv4Addr::new(10, 64, 3, 2));

    let first_id = first["id"].as_str().unwrap();
    let (status, body) = json_request(
        &app,
        "DELETE",
        &format!("/accounts/v1/devices/{first_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = json_request(
        &app,
        "GET",
        &format!("/accounts/v1/devices/{first_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The freed address is handed out again.
    let (status, third) = add_device(&app, &token, "ghi").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(host(&third["ipv4_address"]), first_ip);
}

#[tokio::test]
async fn test_delete_unknown_device_is_404() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    let (status, _) = json_request(
        &app,
        "DELETE",
        "/accounts/v1/devices/d8ca65f2-335c-4c0a-a6d7-2d4fd01bffa9",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_device_id_is_404() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    for method in ["GET", "DELETE"] {
        let (status, body) = json_request(
            &app,
            method,
            "/accounts/v1/devices/not-a-uuid",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method}");
        assert_eq!(body["code"], "NOT_FOUND", "{method}");
    }
}

#[tokio::test]
async fn test_devices_are_scoped_to_account() {
    let (app, _) = setup_app().await;
    let (_, alice) = create_account_and_login(&app).await;
    let (_, bob) = create_account_and_login(&app).await;

    let (status, device) = add_device(&app, &alice, "alice-key").await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/accounts/v1/devices/{}", device["id"].as_str().unwrap());

    let (status, _) = json_request(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = json_request(&app, "DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = json_request(&app, "GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pubkey"], "alice-key");
}

#[tokio::test]
async fn test_device_quota_enforced() {
    let (app, _) = setup_app_with(2, "10.64.0.0/10", DEFAULT_START).await;
    let (_, token) = create_account_and_login(&app).await;

    for key in ["k1", "k2"] {
        let (status, _) = add_device(&app, &token, key).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = add_device(&app, &token, "k3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MAX_DEVICES_REACHED");

    let (status, body) =
        json_request(&app, "GET", "/accounts/v1/devices", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, me) = json_request(&app, "GET", "/accounts/v1/accounts/me", Some(&token), None).await;
    assert_eq!(me["can_add_devices"], false);
}

#[tokio::test]
async fn test_address_exhaustion() {
    // A /30 has exactly two host addresses.
    let (app, _) = setup_app_with(5, "10.64.0.0/30", "10.64.0.1").await;
    let (_, token) = create_account_and_login(&app).await;

    let (_, a) = add_device(&app, &token, "a").await;
    let (_, b) = add_device(&app, &token, "b").await;
    assert_eq!(host(&a["ipv4_address"]), Ipv4Addr::new(10, 64, 0, 1));
    assert_eq!(host(&b["ipv4_address"]), Ipv4Addr::new(10, 64, 0, 2));

    let (status, body) = add_device(&app, &token, "c").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "ADDRESSES_EXHAUSTED");
}

#[tokio::test]
async fn test_empty_pubkey_rejected() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    let (status, _) = add_device(&app, &token, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Vouchers -----------------------------------------------------------------

#[tokio::test]
async fn test_voucher_redeemed_once() {
    let (app, state) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    state
        .repo
        .insert_vouchers(&["ABCD1234EFGH5678".to_string()], 1)
        .await
        .unwrap();

    // Grouped, lower-case input is accepted.
    let (status, body) = json_request(
        &app,
        "POST",
        "/app/v1/submit-voucher",
        Some(&token),
        Some(json!({ "voucher_code": "abcd-1234-efgh-5678" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["time_added"], 2_592_000);
    let new_expiry = body["new_expiry"].as_str().unwrap().to_string();
    assert_timestamp_format(&new_expiry);

    let (_, me) = json_request(&app, "GET", "/accounts/v1/accounts/me", Some(&token), None).await;
    assert_eq!(me["expiry"], new_expiry.as_str());

    let (status, body) = json_request(
        &app,
        "POST",
        "/app/v1/submit-voucher",
        Some(&token),
        Some(json!({ "voucher_code": "ABCD1234EFGH5678" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VOUCHER_USED");
}

#[tokio::test]
async fn test_unknown_voucher_is_404() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    let (status, _) = json_request(
        &app,
        "POST",
        "/app/v1/submit-voucher",
        Some(&token),
        Some(json!({ "voucher_code": "ZZZZZZZZZZZZZZZZ" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_ascii_voucher_code_is_404() {
    let (app, _) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    let (status, body) = json_request(
        &app,
        "POST",
        "/app/v1/submit-voucher",
        Some(&token),
        Some(json!({ "voucher_code": "ABCDEFGéHIJ" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_submit_voucher_requires_auth() {
    let (app, _) = setup_app().await;
    let (status, _) = json_request(
        &app,
        "POST",
        "/app/v1/submit-voucher",
        None,
        Some(json!({ "voucher_code": "ABCD1234EFGH5678" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Static resources ---------------------------------------------------------

#[tokio::test]
async fn test_release_lookup() {
    let (app, _) = setup_app().await;

    let (status, body) =
        json_request(&app, "GET", "/app/v1/releases/android/2023.1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["supported"], true);
    assert_eq!(body["latest"], "2023.7");
    assert_eq!(body["latest_beta"], Value::Null);

    let (status, _) =
        json_request(&app, "GET", "/app/v1/releases/android/1999.1", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relays_and_api_addrs_passthrough() {
    let (app, _) = setup_app().await;

    let (status, relays) = json_request(&app, "GET", "/app/v1/relays", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(relays["wireguard"]["relays"].is_array());

    let (status, addrs) = json_request(&app, "GET", "/app/v1/api-addrs", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(addrs, json!(["192.0.2.10:443"]));
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup_app().await;
    let (status, body) = json_request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// -- Change events ------------------------------------------------------------

#[tokio::test]
async fn test_sse_streams_device_changes() {
    let (app, state) = setup_app().await;
    let (_, token) = create_account_and_login(&app).await;

    let req = Request::builder()
        .uri("/sse/events")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(state.notifier.listener_count(), 1);

    let mut body = resp.into_body();

    let (status, _) = add_device(&app, &token, "secret-pubkey").await;
    assert_eq!(status, StatusCode::CREATED);

    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("event within timeout")
        .expect("stream open")
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: update"), "{text}");
    assert!(text.contains("\"type\":\"INSERT\""), "{text}");
    assert!(text.contains("\"table\":\"devices\""), "{text}");
    assert!(!text.contains("secret-pubkey"), "{text}");

    // Disconnecting releases the listener.
    drop(body);
    assert_eq!(state.notifier.listener_count(), 0);
}
