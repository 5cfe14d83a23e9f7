mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use lms_admin_core::config::AppConfig;
use lms_admin_core::error::AuthError;
use lms_admin_core::session::Hydration;
use lms_admin_core::storage::{keys, MemoryStorage, Storage};
use lms_admin_core::types::{ChangePassword, Credentials, RegisterData};
use serde_json::json;

use common::*;

fn credentials() -> Credentials {
    Credentials {
        email: "ada@example.com".to_string(),
        password: "secret".to_string(),
        remember: true,
    }
}

#[tokio::test]
async fn login_sets_user_and_token_together() {
    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(POST)
            .path("/auth/login")
            .json_body(json!({"email": "ada@example.com", "password": "secret", "remember": true}));
        then.status(200).json_body(auth_json("tok", "ref"));
    });

    let h = Harness::new(&server);
    h.ctx.session().login(&credentials()).await.unwrap();

    let session = h.ctx.session().session();
    assert!(session.is_authenticated());
    assert!(!session.is_loading);
    assert!(session.error.is_none());
    assert_eq!(session.user.map(|u| u.email), Some("ada@example.com".to_string()));
    login.assert_calls(1);

    assert_eq!(h.storage.get(keys::AUTH_TOKEN).unwrap().as_deref(), Some("tok"));
    assert_eq!(h.storage.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("ref"));
    assert!(h.storage.get(keys::USER).unwrap().is_some());
}

#[tokio::test]
async fn rejected_login_surfaces_server_message_without_refresh() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(401).json_body(json!({"message": "These credentials do not match our records."}));
    });
    let refresh = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).json_body(auth_json("x", "y"));
    });

    let h = Harness::new(&server);
    let err = h.ctx.session().login(&credentials()).await.unwrap_err();

    assert_eq!(
        err,
        AuthError::InvalidCredentials("These credentials do not match our records.".to_string())
    );
    let session = h.ctx.session().session();
    assert!(!session.is_authenticated());
    assert!(session.token.is_none());
    assert_eq!(session.error.as_deref(), Some("These credentials do not match our records."));
    refresh.assert_calls(0);
    assert!(h.navigator.redirects().is_empty());
    assert!(h.storage.keys().is_empty());
}

#[tokio::test]
async fn rejected_login_replaces_existing_session() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(401).json_body(json!({"message": "These credentials do not match our records."}));
    });

    let h = Harness::with_storage(&server, seeded_storage("old", Some("r1"), true));
    assert!(h.ctx.session().session().is_authenticated());

    let err = h.ctx.session().login(&credentials()).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials(_)));
    let session = h.ctx.session().session();
    assert!(!session.is_authenticated());
    assert!(session.token.is_none() && session.user.is_none());
    assert_eq!(session.error.as_deref(), Some("These credentials do not match our records."));
    assert!(h.storage.get(keys::AUTH_TOKEN).unwrap().is_none());
    assert!(h.storage.get(keys::REFRESH_TOKEN).unwrap().is_none());
}

#[tokio::test]
async fn failed_login_on_server_error_uses_generic_message() {
    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(500).json_body(json!({"message": "stack trace here"}));
    });

    let h = Harness::new(&server);
    let err = h.ctx.session().login(&credentials()).await.unwrap_err();

    assert!(matches!(err, AuthError::Remote(_)));
    let error = h.ctx.session().session().error.unwrap();
    assert!(!error.contains("stack trace"));
    login.assert_calls(3);
}

#[tokio::test]
async fn login_without_user_fetches_it_before_publishing() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(200).json_body(json!({"data": {"token": "tok"}}));
    });
    let me = server.mock(|when, then| {
        when.method(GET).path("/auth/me").header("authorization", "Bearer tok");
        then.status(200).json_body(json!({"data": user_json()}));
    });

    let h = Harness::new(&server);
    h.ctx.session().login(&credentials()).await.unwrap();

    assert!(h.ctx.session().session().is_authenticated());
    me.assert_calls(1);
}

#[tokio::test]
async fn login_without_resolvable_user_leaves_no_partial_state() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(200).json_body(json!({"data": {"token": "tok"}}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/auth/me");
        then.status(403).json_body(json!({"message": "Account disabled"}));
    });

    let h = Harness::new(&server);
    assert!(h.ctx.session().login(&credentials()).await.is_err());

    let session = h.ctx.session().session();
    assert!(session.token.is_none());
    assert!(session.user.is_none());
    assert_eq!(session.error.as_deref(), Some("Account disabled"));
    assert!(h.storage.keys().is_empty());
}

#[tokio::test]
async fn register_authenticates() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/register");
        then.status(201).json_body(auth_json("tok", "ref"));
    });

    let h = Harness::new(&server);
    let data = RegisterData {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        password: "secret123".to_string(),
        password_confirmation: "secret123".to_string(),
    };
    h.ctx.session().register(&data).await.unwrap();
    assert!(h.ctx.session().session().is_authenticated());
}

#[tokio::test]
async fn logout_clears_local_state_even_when_remote_fails() {
    let server = MockServer::start();
    let logout = server.mock(|when, then| {
        when.method(POST).path("/auth/logout");
        then.status(500);
    });

    let storage = seeded_storage("tok", Some("ref"), true);
    storage.set(keys::THEME_MODE, "\"dark\"").unwrap();
    let h = Harness::with_storage(&server, storage);
    assert!(h.ctx.session().session().is_authenticated());

    h.ctx.session().logout().await;

    logout.assert_calls(3);
    assert_eq!(h.ctx.session().session(), Default::default());
    assert_eq!(h.storage.keys(), vec![keys::THEME_MODE.to_string()]);
}

#[tokio::test]
async fn logout_survives_unreachable_server() {
    let config = AppConfig::for_base_url("http://127.0.0.1:1");
    let h = Harness::build(config, seeded_storage("tok", Some("ref"), true), "/dashboard");

    h.ctx.session().logout().await;

    assert!(!h.ctx.session().session().is_authenticated());
    assert!(h.storage.keys().is_empty());
}

#[tokio::test]
async fn explicit_refresh_rotates_tokens() {
    let server = MockServer::start();
    let refresh = server.mock(|when, then| {
        when.method(POST)
            .path("/auth/refresh")
            .json_body(json!({"refresh_token": "r1"}));
        then.status(200).json_body(json!({"data": {"token": "t2", "refresh_token": "r2"}}));
    });

    let h = Harness::with_storage(&server, seeded_storage("t1", Some("r1"), true));
    h.ctx.session().refresh_token().await.unwrap();

    refresh.assert_calls(1);
    let session = h.ctx.session().session();
    assert_eq!(session.token.as_deref(), Some("t2"));
    assert!(session.is_authenticated());
    assert_eq!(h.storage.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("r2"));
}

#[tokio::test]
async fn explicit_refresh_with_unchanged_token_signs_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).json_body(json!({"data": {"token": "t1"}}));
    });
    server.mock(|when, then| {
        when.method(POST).path("/auth/logout");
        then.status(204);
    });

    let h = Harness::with_storage(&server, seeded_storage("t1", Some("r1"), true));
    let err = h.ctx.session().refresh_token().await.unwrap_err();

    assert!(matches!(err, AuthError::RefreshFailed(_)));
    let session = h.ctx.session().session();
    assert!(session.token.is_none() && session.user.is_none());
    assert!(session.error.is_some());
    assert!(h.storage.keys().is_empty());
}

#[tokio::test]
async fn get_user_requires_a_token() {
    let server = MockServer::start();
    let h = Harness::new(&server);
    assert_eq!(h.ctx.session().get_user().await.unwrap_err(), AuthError::NotAuthenticated);
}

#[tokio::test]
async fn change_password_posts_confirmation() {
    let server = MockServer::start();
    let change = server.mock(|when, then| {
        when.method(POST)
            .path("/auth/change-password")
            .header("authorization", "Bearer tok")
            .json_body(json!({
                "current_password": "old-secret",
                "new_password": "new-secret",
                "new_password_confirmation": "new-secret"
            }));
        then.status(200).json_body(json!({"message": "Password updated"}));
    });

    let h = Harness::with_storage(&server, seeded_storage("tok", None, true));
    let request = ChangePassword {
        current_password: "old-secret".to_string(),
        new_password: "new-secret".to_string(),
        new_password_confirmation: "new-secret".to_string(),
    };
    h.ctx.session().change_password(&request).await.unwrap();
    change.assert_calls(1);
}

#[tokio::test]
async fn hydration_waits_for_tenant_resolution() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tenants/acme/config");
        then.status(200)
            .delay(Duration::from_millis(50))
            .json_body(tenant_json("acme"));
    });
    // Only answers once the tenant headers are present.
    let me = server.mock(|when, then| {
        when.method(GET)
            .path("/auth/me")
            .header("authorization", "Bearer tok")
            .header("x-tenant-id", "acme");
        then.status(200).json_body(json!({"data": user_json()}));
    });

    let h = Harness::with_storage(&server, seeded_storage("tok", Some("ref"), false));
    assert!(!h.ctx.session().session().is_authenticated());

    let report = h.ctx.boot(&location("https://acme.app.com/")).await;

    assert_eq!(report.hydration, Hydration::Authenticated);
    assert!(h.ctx.session().session().is_authenticated());
    me.assert_calls(1);
}

#[tokio::test]
async fn hydration_skipped_without_tenant() {
    let server = MockServer::start();
    let me = server.mock(|when, then| {
        when.method(GET).path("/auth/me");
        then.status(200).json_body(json!({"data": user_json()}));
    });

    let h = Harness::with_storage(&server, seeded_storage("tok", None, false));
    let report = h.ctx.boot(&location("http://localhost/")).await;

    assert_eq!(report.hydration, Hydration::TenantUnavailable);
    me.assert_calls(0);
    // Credentials are kept for when a tenant becomes available.
    assert_eq!(h.storage.get(keys::AUTH_TOKEN).unwrap().as_deref(), Some("tok"));
}

#[tokio::test]
async fn hydration_with_rejected_token_signs_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tenants/acme/config");
        then.status(200).json_body(tenant_json("acme"));
    });
    server.mock(|when, then| {
        when.method(GET).path("/auth/me");
        then.status(401);
    });

    let storage = Arc::new(MemoryStorage::new());
    seed_credentials(&storage, "tok", None, false);
    let h = Harness::with_storage(&server, storage);
    let report = h.ctx.boot(&location("https://acme.app.com/")).await;

    assert_eq!(report.hydration, Hydration::SignedOut);
    assert!(h.ctx.session().session().token.is_none());
    assert!(h.storage.get(keys::AUTH_TOKEN).unwrap().is_none());
    assert_eq!(h.navigator.redirects(), vec!["/auth/sign-in".to_string()]);
}
