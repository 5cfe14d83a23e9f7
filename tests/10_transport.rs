mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use lms_admin_core::config::AppConfig;
use lms_admin_core::error::{AuthError, TransportError};
use lms_admin_core::storage::{keys, MemoryStorage, Storage};
use lms_admin_core::transport::{ApiRequest, RequestPhase};
use serde_json::{json, Value};

use common::*;

fn courses() -> ApiRequest {
    ApiRequest::new(reqwest::Method::GET, "/courses")
}

#[tokio::test]
async fn expired_token_is_refreshed_once_and_replayed() {
    let server = MockServer::start();
    let stale = server.mock(|when, then| {
        when.method(GET).path("/courses").header("authorization", "Bearer old");
        then.status(401).json_body(json!({"message": "Token expired"}));
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).json_body(auth_json("new", "r2"));
    });
    let fresh = server.mock(|when, then| {
        when.method(GET).path("/courses").header("authorization", "Bearer new");
        then.status(200).json_body(json!({"data": [{"id": 1}]}));
    });

    let h = Harness::with_storage(&server, seeded_storage("old", Some("r1"), true));
    let (result, trace) = h.ctx.api().execute_traced(courses()).await;

    assert_eq!(result.unwrap(), json!({"data": [{"id": 1}]}));
    assert_eq!(trace.attempts, 2);
    assert_eq!(trace.refreshes, 1);
    assert!(trace.phases.contains(&RequestPhase::Replayed));
    assert_eq!(trace.last_phase(), Some(&RequestPhase::Completed));
    stale.assert_calls(1);
    refresh.assert_calls(1);
    fresh.assert_calls(1);

    assert_eq!(h.storage.get(keys::AUTH_TOKEN).unwrap().as_deref(), Some("new"));
    assert_eq!(h.storage.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("r2"));
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn second_401_redirects_without_another_refresh() {
    let server = MockServer::start();
    let courses_mock = server.mock(|when, then| {
        when.method(GET).path("/courses");
        then.status(401).json_body(json!({"message": "Unauthenticated."}));
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).json_body(auth_json("new", "r2"));
    });

    let h = Harness::with_storage(&server, seeded_storage("old", Some("r1"), true));
    let (result, trace) = h.ctx.api().execute_traced(courses()).await;

    assert!(matches!(result, Err(TransportError::Auth(AuthError::SessionExpired))));
    assert_eq!(trace.refreshes, 1);
    courses_mock.assert_calls(2);
    refresh.assert_calls(1);

    assert_eq!(h.navigator.redirects(), vec!["/auth/sign-in".to_string()]);
    assert!(h.storage.keys().is_empty());
    assert!(!h.ctx.session().session().is_authenticated());
}

#[tokio::test]
async fn no_redirect_when_already_on_sign_in() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/courses");
        then.status(401);
    });

    let config = AppConfig::for_base_url(server.base_url());
    let h = Harness::build(config, seeded_storage("old", None, true), "/auth/sign-in");
    let (result, _) = h.ctx.api().execute_traced(courses()).await;

    assert!(matches!(result, Err(TransportError::Auth(AuthError::MissingRefreshToken))));
    assert!(h.navigator.redirects().is_empty());
    assert!(h.storage.get(keys::AUTH_TOKEN).unwrap().is_none());
}

#[tokio::test]
async fn refresh_returning_same_token_is_a_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/courses");
        then.status(401);
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).json_body(auth_json("old", "r1"));
    });

    let h = Harness::with_storage(&server, seeded_storage("old", Some("r1"), true));
    let (result, trace) = h.ctx.api().execute_traced(courses()).await;

    assert!(matches!(result, Err(TransportError::Auth(AuthError::RefreshFailed(_)))));
    assert_eq!(trace.attempts, 1);
    refresh.assert_calls(1);
    assert!(h.storage.keys().is_empty());
    assert_eq!(h.navigator.redirects().len(), 1);
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start();
    let stale = server.mock(|when, then| {
        when.method(GET).header("authorization", "Bearer old");
        then.status(401);
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200)
            .delay(Duration::from_millis(50))
            .json_body(auth_json("new", "r2"));
    });
    let fresh = server.mock(|when, then| {
        when.method(GET).header("authorization", "Bearer new");
        then.status(200).json_body(json!({"data": []}));
    });

    let h = Harness::with_storage(&server, seeded_storage("old", Some("r1"), true));
    let api = h.ctx.api();
    let (courses, users, categories) = tokio::join!(
        api.get::<Value>("/courses"),
        api.get::<Value>("/users"),
        api.get::<Value>("/categories"),
    );

    assert!(courses.is_ok() && users.is_ok() && categories.is_ok());
    refresh.assert_calls(1);
    stale.assert_calls(3);
    fresh.assert_calls(3);
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn server_errors_stop_after_three_attempts() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/courses");
        then.status(500).json_body(json!({"message": "SQLSTATE[HY000] connection lost"}));
    });

    let h = Harness::new(&server);
    let (result, trace) = h.ctx.api().execute_traced(courses()).await;

    let err = result.unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert!(!err.user_message().contains("SQLSTATE"));
    mock.assert_calls(3);
    assert_eq!(trace.attempts, 3);
    assert_eq!(trace.retries(), 2);
    // base 5ms doubled per retry
    assert_eq!(trace.delays, vec![Duration::from_millis(10), Duration::from_millis(20)]);
}

#[tokio::test]
async fn network_failures_retry_with_constant_delay() {
    // Nothing listens on port 1.
    let config = AppConfig::for_base_url("http://127.0.0.1:1/api");
    let h = Harness::build(config, Arc::new(MemoryStorage::new()), "/dashboard");

    let (result, trace) = h.ctx.api().execute_traced(courses()).await;

    let err = result.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
    assert!(err.user_message().contains("Unable to reach the server"));
    assert_eq!(trace.attempts, 3);
    assert_eq!(trace.delays, vec![Duration::from_millis(5), Duration::from_millis(5)]);
    assert_eq!(trace.refreshes, 0);
}

#[tokio::test]
async fn requests_carry_bearer_and_tenant_headers() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tenants/acme/config");
        then.status(200).json_body(tenant_json("acme"));
    });
    let scoped = server.mock(|when, then| {
        when.method(GET)
            .path("/courses")
            .header("authorization", "Bearer tok")
            .header("x-tenant-id", "acme")
            .header("x-tenant-domain", "acme.app.com")
            .header_exists("x-request-time");
        then.status(200).json_body(json!({"data": []}));
    });

    let h = Harness::with_storage(&server, seeded_storage("tok", None, true));
    let state = h.ctx.tenant().resolve_tenant(&location("https://acme.app.com/courses")).await;
    assert!(state.is_resolved());

    let body: Value = h.ctx.api().get("/courses").await.unwrap();
    assert_eq!(body["data"], json!([]));
    scoped.assert_calls(1);
}

#[tokio::test]
async fn anonymous_requests_omit_optional_headers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/public/catalog")
            .header_missing("authorization")
            .header_missing("x-tenant-id");
        then.status(200).json_body(json!({"data": []}));
    });

    let h = Harness::new(&server);
    let _: Value = h.ctx.api().get("/public/catalog").await.unwrap();
    mock.assert_calls(1);
}
