//! Integration tests for the platform API.
//!
//! Uses axum-test to drive the full router in process, on in-memory
//! backends. Caller IPs come from `X-Forwarded-For`, so every server here
//! trusts proxy headers.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestResponse, TestServer};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{TimeDelta, Utc};
use platform_api::{
    AppState, Backends,
    config::Config,
    create_router,
    error::ErrorEnvelope,
    handlers::health::HealthResponse,
    models::{api_key::ApiKey, api_log::ApiLogEntry},
    pagination::PageEnvelope,
    services::{localization::Localizer, throttle::AUTO_BAN_REASON},
    store::{
        AbuseLedger, BanStore,
        memory::{MemoryAbuseLedger, MemoryBanStore, MemoryKeyStore},
    },
};
use serde_json::{Value, json};

const KEY: &str = "integration-key";
const CALLER: &str = "203.0.113.20";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

struct Harness {
    server: TestServer,
    keys: Arc<MemoryKeyStore>,
    ledger: Arc<MemoryAbuseLedger>,
    bans: Arc<MemoryBanStore>,
}

fn config() -> Config {
    Config {
        trust_proxy_headers: true,
        ..Config::default()
    }
}

/// Server with one unrestricted key, [`KEY`].
async fn harness_with(config: Config) -> Harness {
    let keys = Arc::new(MemoryKeyStore::new());
    keys.insert(ApiKey::issue(KEY, "integration tests")).await;

    let ledger = Arc::new(MemoryAbuseLedger::new());
    let bans = Arc::new(MemoryBanStore::new());

    let backends = Backends::in_memory(keys.clone(), ledger.clone(), bans.clone());
    let state = AppState::new(config, backends).unwrap();

    Harness {
        server: TestServer::new(create_router(state)).unwrap(),
        keys,
        ledger,
        bans,
    }
}

async fn harness() -> Harness {
    harness_with(config()).await
}

fn forwarded_for() -> HeaderName {
    HeaderName::from_static("x-forwarded-for")
}

fn value(text: &str) -> HeaderValue {
    text.parse::<HeaderValue>().unwrap()
}

fn bearer(key: &str) -> HeaderValue {
    value(&format!("Bearer {key}"))
}

fn bad_key_entry(ip: &str, minutes_ago: i64) -> ApiLogEntry {
    ApiLogEntry {
        endpoint: "core/members".to_string(),
        method: "GET".to_string(),
        api_key: Some("wrong".to_string()),
        ip_address: ip.to_string(),
        request_data: "{}".to_string(),
        response_code: 401,
        response_output: String::new(),
        created_at: Utc::now() - TimeDelta::minutes(minutes_ago),
        is_bad_key: true,
    }
}

fn assert_error(response: &TestResponse, status: u16, code: &str) {
    assert_eq!(response.status_code().as_u16(), status, "{}", response.text());
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.error_message, code);
}

impl Harness {
    async fn get(&self, path: &str) -> TestResponse {
        self.server
            .get(path)
            .add_header(header::AUTHORIZATION, bearer(KEY))
            .add_header(forwarded_for(), value(CALLER))
            .await
    }

    async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.server
            .post(path)
            .add_header(header::AUTHORIZATION, bearer(KEY))
            .add_header(forwarded_for(), value(CALLER))
            .json(&body)
            .await
    }

    async fn delete(&self, path: &str) -> TestResponse {
        self.server
            .delete(path)
            .add_header(header::AUTHORIZATION, bearer(KEY))
            .add_header(forwarded_for(), value(CALLER))
            .await
    }

    async fn create_member(&self, name: &str) -> Value {
        let response = self
            .post(
                "/api/core/members",
                json!({ "name": name, "email": format!("{name}@example.com") }),
            )
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }
}

// =============================================================================
// HEALTH
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let harness = harness().await;

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.database, "connected");
}

// =============================================================================
// ROUTING
// =============================================================================

#[tokio::test]
async fn test_injected_app_token_is_rejected_before_any_lookup() {
    let harness = harness().await;
    // A banned caller still gets the routing error: the ban list is not consulted.
    harness.bans.insert_ip_ban(CALLER, "manual").await.unwrap();

    let response = harness.get("/api/core;drop/members").await;

    assert_error(&response, 400, "INVALID_APP");
    let envelope: ErrorEnvelope = response.json();
    assert_eq!(envelope.error_code, "3S290/2");
    assert!(harness.ledger.entries().await.is_empty());
}

#[tokio::test]
async fn test_malformed_controller_token_is_rejected() {
    let harness = harness().await;

    assert_error(&harness.get("/api/core/mem-bers").await, 400, "INVALID_CONTROLLER");
    assert_error(&harness.get("/api/core").await, 400, "INVALID_CONTROLLER");
    assert_error(&harness.get("/api").await, 400, "INVALID_APP");
}

#[tokio::test]
async fn test_unknown_app_and_controller_are_not_found() {
    let harness = harness().await;

    let response = harness.get("/api/shop/items").await;
    assert_error(&response, 404, "INVALID_APP");
    assert_eq!(response.json::<ErrorEnvelope>().error_code, "2S290/3");

    assert_error(&harness.get("/api/core/groups").await, 404, "INVALID_CONTROLLER");
}

#[tokio::test]
async fn test_disabled_app_is_unavailable() {
    let harness = harness_with(Config {
        disabled_apps: vec!["forums".to_string()],
        ..config()
    })
    .await;

    assert_error(&harness.get("/api/forums/forums").await, 503, "APP_DISABLED");
    harness.get("/api/core/members").await.assert_status_ok();
}

#[tokio::test]
async fn test_unmapped_verb_has_no_endpoint() {
    let harness = harness().await;

    assert_error(&harness.delete("/api/core/members").await, 404, "NO_ENDPOINT");
}

#[tokio::test]
async fn test_query_string_mode() {
    let harness = harness_with(Config {
        friendly_urls: false,
        ..config()
    })
    .await;
    harness
        .post(
            "/api/?/core/members",
            json!({ "name": "quinn", "email": "quinn@example.com" }),
        )
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = harness.get("/api/?/core/members&page=1").await;

    response.assert_status_ok();
    let page: PageEnvelope = response.json();
    assert_eq!(page.total_results, 1);
    assert_eq!(page.results[0]["name"], "quinn");
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

#[tokio::test]
async fn test_missing_key_is_rejected_and_not_logged() {
    let harness = harness().await;

    let response = harness
        .server
        .get("/api/core/members")
        .add_header(forwarded_for(), value(CALLER))
        .await;

    assert_error(&response, 401, "NO_API_KEY");
    assert!(harness.ledger.entries().await.is_empty());
}

#[tokio::test]
async fn test_invalid_key_is_logged_as_bad_key() {
    let harness = harness().await;

    let response = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer("nope"))
        .add_header(forwarded_for(), value(CALLER))
        .await;

    assert_error(&response, 401, "INVALID_API_KEY");
    let entries = harness.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_bad_key);
    assert_eq!(entries[0].ip_address, CALLER);
    assert_eq!(entries[0].api_key.as_deref(), Some("nope"));
    assert_eq!(entries[0].response_code, 401);
}

#[tokio::test]
async fn test_basic_auth_username_is_the_key() {
    let harness = harness().await;
    let encoded = STANDARD.encode(format!("{KEY}:unused"));

    let response = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, value(&format!("Basic {encoded}")))
        .add_header(forwarded_for(), value(CALLER))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_key_in_body_is_accepted() {
    let harness = harness().await;

    let response = harness
        .server
        .post("/api/core/members")
        .add_header(forwarded_for(), value(CALLER))
        .json(&json!({ "key": KEY, "name": "body", "email": "body@example.com" }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
}

#[tokio::test]
async fn test_key_in_url_is_refused_by_default() {
    let harness = harness().await;

    let response = harness
        .server
        .get(&format!("/api/core/members?key={KEY}"))
        .add_header(forwarded_for(), value(CALLER))
        .await;

    assert_error(&response, 403, "CANNOT_USE_KEY_AS_URL_PARAM");
    let entries = harness.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].is_bad_key);
}

#[tokio::test]
async fn test_key_in_url_when_deployment_allows_it() {
    let harness = harness_with(Config {
        allow_key_as_url_param: true,
        ..config()
    })
    .await;

    let response = harness
        .server
        .get(&format!("/api/core/members?key={KEY}"))
        .add_header(forwarded_for(), value(CALLER))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_ip_allow_list_is_enforced() {
    let harness = harness().await;
    harness
        .keys
        .insert(ApiKey::issue("office-key", "office").with_allowed_ips(["192.0.2.0/24"]))
        .await;

    let inside = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer("office-key"))
        .add_header(forwarded_for(), value("192.0.2.44"))
        .await;
    inside.assert_status_ok();

    let outside = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer("office-key"))
        .add_header(forwarded_for(), value("198.51.100.3"))
        .await;
    assert_error(&outside, 403, "IP_ADDRESS_NOT_ALLOWED");
    assert_eq!(harness.ledger.entries().await.len(), 1);
}

#[tokio::test]
async fn test_app_restriction_is_enforced() {
    let harness = harness().await;
    harness
        .keys
        .insert(ApiKey::issue("blog-key", "blog only").with_allowed_apps(["blog"]))
        .await;

    let response = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer("blog-key"))
        .add_header(forwarded_for(), value(CALLER))
        .await;

    assert_error(&response, 403, "NO_PERMISSION");
}

#[tokio::test]
async fn test_test_key_skips_ip_and_url_checks() {
    let harness = harness_with(Config {
        enable_test_key: true,
        ..config()
    })
    .await;
    harness
        .keys
        .insert(ApiKey::issue("test", "sandbox").with_allowed_ips(["10.0.0.1"]))
        .await;

    let response = harness
        .server
        .get("/api/core/members?key=test")
        .add_header(forwarded_for(), value("198.51.100.9"))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_unregistered_test_key_is_invalid() {
    let harness = harness_with(Config {
        enable_test_key: true,
        ..config()
    })
    .await;

    let response = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer("test"))
        .add_header(forwarded_for(), value(CALLER))
        .await;

    assert_error(&response, 401, "INVALID_API_KEY");
}

#[tokio::test]
async fn test_test_key_is_ordinary_without_flag() {
    let harness = harness().await;
    harness
        .keys
        .insert(ApiKey::issue("test", "sandbox").with_allowed_ips(["10.0.0.1"]))
        .await;

    let response = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer("test"))
        .add_header(forwarded_for(), value(CALLER))
        .await;

    assert_error(&response, 403, "IP_ADDRESS_NOT_ALLOWED");
}

#[tokio::test]
async fn test_language_header_is_validated() {
    let harness = harness().await;

    let unsupported = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer(KEY))
        .add_header(HeaderName::from_static("x-language"), value("fr"))
        .await;
    assert_error(&unsupported, 400, "INVALID_LANGUAGE");

    let supported = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer(KEY))
        .add_header(HeaderName::from_static("x-language"), value("EN"))
        .await;
    supported.assert_status_ok();
}

// =============================================================================
// THROTTLING
// =============================================================================

#[tokio::test]
async fn test_eleven_bad_keys_ban_the_caller_once() {
    let harness = harness().await;
    for _ in 0..11 {
        harness
            .ledger
            .record(&bad_key_entry(CALLER, 60))
            .await
            .unwrap();
    }

    assert_error(&harness.get("/api/core/members").await, 403, "IP_ADDRESS_BANNED");
    assert_error(&harness.get("/api/core/members").await, 403, "IP_ADDRESS_BANNED");

    let bans = harness.bans.bans().await;
    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].ip_pattern, CALLER);
    assert_eq!(bans[0].reason, AUTO_BAN_REASON);
}

#[tokio::test]
async fn test_ten_bad_keys_do_not_ban() {
    let harness = harness().await;
    for _ in 0..10 {
        harness
            .ledger
            .record(&bad_key_entry(CALLER, 60))
            .await
            .unwrap();
    }

    harness.get("/api/core/members").await.assert_status_ok();
    assert!(harness.bans.bans().await.is_empty());
}

#[tokio::test]
async fn test_recent_bad_keys_are_throttled() {
    let harness = harness().await;
    for _ in 0..2 {
        harness
            .ledger
            .record(&bad_key_entry(CALLER, 1))
            .await
            .unwrap();
    }

    assert_error(
        &harness.get("/api/core/members").await,
        429,
        "TOO_MANY_REQUESTS_WITH_BAD_KEY",
    );

    // Other callers are unaffected
    let other = harness
        .server
        .get("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer(KEY))
        .add_header(forwarded_for(), value("198.51.100.77"))
        .await;
    other.assert_status_ok();
}

#[tokio::test]
async fn test_old_bad_keys_do_not_throttle() {
    let harness = harness().await;
    for _ in 0..2 {
        harness
            .ledger
            .record(&bad_key_entry(CALLER, 6))
            .await
            .unwrap();
    }

    harness.get("/api/core/members").await.assert_status_ok();
}

#[tokio::test]
async fn test_wildcard_ban_pattern() {
    let harness = harness().await;
    harness.bans.insert_ip_ban("203.0.113.*", "range").await.unwrap();

    assert_error(&harness.get("/api/core/members").await, 403, "IP_ADDRESS_BANNED");
}

// =============================================================================
// RESOURCES
// =============================================================================

#[tokio::test]
async fn test_post_then_get_round_trip() {
    let harness = harness().await;
    let author = harness.create_member("alice").await;

    let created = harness
        .post(
            "/api/blog/entries",
            json!({
                "title": "Release notes",
                "content": "Everything is faster.",
                "author": author["id"],
                "pinned": true,
            }),
        )
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let created: Value = created.json();

    let fetched = harness
        .get(&format!("/api/blog/entries/{}", created["id"]))
        .await;
    fetched.assert_status_ok();
    let fetched: Value = fetched.json();

    assert_eq!(fetched, created);
    assert_eq!(fetched["title"], "Release notes");
    assert_eq!(fetched["content"], "Everything is faster.");
    assert_eq!(fetched["author"], author["id"]);
    assert_eq!(fetched["pinned"], true);
    assert_eq!(fetched["hidden"], false);
}

#[tokio::test]
async fn test_validation_errors_carry_resource_codes() {
    let harness = harness().await;

    let response = harness
        .post("/api/blog/entries", json!({ "content": "no title" }))
        .await;
    assert_error(&response, 400, "NO_TITLE");
    assert_eq!(response.json::<ErrorEnvelope>().error_code, "1B300/2");

    let response = harness
        .post(
            "/api/blog/entries",
            json!({ "title": "t", "content": "c", "author": 99 }),
        )
        .await;
    assert_error(&response, 404, "INVALID_AUTHOR");

    harness.create_member("bob").await;
    let response = harness
        .post(
            "/api/core/members",
            json!({ "name": "bob", "email": "other@example.com" }),
        )
        .await;
    assert_error(&response, 403, "USERNAME_EXISTS");
}

#[tokio::test]
async fn test_delete_missing_id_is_invalid_id() {
    let harness = harness().await;

    let response = harness.delete("/api/core/members/12345").await;

    assert_error(&response, 404, "INVALID_ID");
    assert_eq!(response.json::<ErrorEnvelope>().error_code, "2C292/2");
}

#[tokio::test]
async fn test_percent_encoded_id_is_decoded() {
    let harness = harness().await;
    let member = harness.create_member("dora").await;
    assert_eq!(member["id"], 1);

    let response = harness.get("/api/core/members/%31").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["name"], "dora");
}

#[tokio::test]
async fn test_deleting_member_removes_their_entries() {
    let harness = harness().await;
    let author = harness.create_member("erin").await;
    let other = harness.create_member("finn").await;

    for (title, member) in [("one", &author), ("two", &author), ("three", &other)] {
        harness
            .post(
                "/api/blog/entries",
                json!({ "title": title, "content": "c", "author": member["id"] }),
            )
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    harness
        .delete(&format!("/api/core/members/{}", author["id"]))
        .await
        .assert_status_ok();

    let listing: PageEnvelope = harness.get("/api/blog/entries").await.json();
    assert_eq!(listing.total_results, 1);
    assert_eq!(listing.results[0]["title"], "three");
}

#[tokio::test]
async fn test_delete_then_get_is_gone() {
    let harness = harness().await;
    let member = harness.create_member("carol").await;
    let path = format!("/api/core/members/{}", member["id"]);

    let deleted = harness.delete(&path).await;
    deleted.assert_status_ok();
    assert!(deleted.text().is_empty());

    assert_error(&harness.get(&path).await, 404, "INVALID_ID");

    // Member deletes are always audited
    let entries = harness.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].method, "DELETE");
    assert_eq!(entries[0].response_code, 200);
    assert!(!entries[0].is_bad_key);
}

#[tokio::test]
async fn test_update_applies_supplied_fields() {
    let harness = harness().await;
    let member = harness.create_member("dave").await;

    let updated = harness
        .server
        .put(&format!("/api/core/members/{}", member["id"]))
        .add_header(header::AUTHORIZATION, bearer(KEY))
        .add_header(forwarded_for(), value(CALLER))
        .json(&json!({ "name": "david" }))
        .await;

    updated.assert_status_ok();
    let updated: Value = updated.json();
    assert_eq!(updated["name"], "david");
    assert_eq!(updated["email"], "dave@example.com");
}

#[tokio::test]
async fn test_pages_are_slices_of_the_full_list() {
    let harness = harness().await;
    for n in 1..=60 {
        harness
            .post("/api/forums/forums", json!({ "name": format!("Forum {n}") }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    for page in 1..=3_i64 {
        let response = harness
            .get(&format!("/api/forums/forums?page={page}"))
            .await;
        response.assert_status_ok();
        let envelope: PageEnvelope = response.json();

        assert_eq!(envelope.page, page);
        assert_eq!(envelope.per_page, 25);
        assert_eq!(envelope.total_results, 60);
        assert_eq!(envelope.total_pages, 3);
        assert!(envelope.results.len() <= 25);

        let positions: Vec<i64> = envelope
            .results
            .iter()
            .map(|forum| forum["position"].as_i64().unwrap())
            .collect();
        let expected: Vec<i64> = ((page - 1) * 25 + 1..=(page * 25).min(60)).collect();
        assert_eq!(positions, expected);
    }

    let beyond: PageEnvelope = harness.get("/api/forums/forums?page=9").await.json();
    assert!(beyond.results.is_empty());
    assert_eq!(beyond.total_pages, 3);
}

#[tokio::test]
async fn test_forum_children_are_nested() {
    let harness = harness().await;
    let root: Value = harness
        .post("/api/forums/forums", json!({ "name": "Root" }))
        .await
        .json();
    harness
        .post(
            "/api/forums/forums",
            json!({ "name": "Child", "parent": root["id"] }),
        )
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let children: PageEnvelope = harness
        .get(&format!("/api/forums/forums/{}/children", root["id"]))
        .await
        .json();

    assert_eq!(children.total_results, 1);
    assert_eq!(children.results[0]["name"], "Child");
    assert_eq!(children.results[0]["parent"], root["id"]);
}

#[tokio::test]
async fn test_log_all_requests() {
    let harness = harness_with(Config {
        log_all_requests: true,
        ..config()
    })
    .await;

    harness.get("/api/core/members").await.assert_status_ok();

    let entries = harness.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].endpoint, "core/members");
    assert_eq!(entries[0].response_code, 200);
    assert!(entries[0].response_output.contains("\"perPage\": 25"));
}

// =============================================================================
// LOCALIZATION
// =============================================================================

/// Marks error messages with the negotiated language.
struct Marking;

impl Localizer for Marking {
    fn localize(&self, output: String, language: Option<&str>) -> String {
        match language {
            Some(language) => output.replace("NO_ENDPOINT", &format!("NO_ENDPOINT@{language}")),
            None => output,
        }
    }
}

#[tokio::test]
async fn test_output_passes_through_localizer() {
    let keys = Arc::new(MemoryKeyStore::new());
    keys.insert(ApiKey::issue(KEY, "integration tests")).await;
    let backends = Backends::in_memory(
        keys,
        Arc::new(MemoryAbuseLedger::new()),
        Arc::new(MemoryBanStore::new()),
    );
    let config = Config {
        supported_languages: vec!["en".to_string(), "de".to_string()],
        ..config()
    };
    let state = AppState::new(config, backends)
        .unwrap()
        .with_localizer(Arc::new(Marking));
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server
        .delete("/api/core/members")
        .add_header(header::AUTHORIZATION, bearer(KEY))
        .add_header(HeaderName::from_static("x-language"), value("DE"))
        .await;

    assert_error(&response, 404, "NO_ENDPOINT@de");
}
