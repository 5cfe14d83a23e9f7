#![allow(dead_code)]

use std::sync::Arc;

use httpmock::MockServer;
use lms_admin_core::config::AppConfig;
use lms_admin_core::storage::{keys, MemoryStorage, Storage, StorageExt};
use lms_admin_core::tenant::Location;
use lms_admin_core::theme::{ColorScheme, StyleSurface, SystemPreference};
use lms_admin_core::transport::MemoryNavigator;
use lms_admin_core::types::User;
use lms_admin_core::AppContext;
use serde_json::{json, Value};

/// A fully wired context against a mock backend, with handles on every
/// in-memory collaborator so tests can inspect side effects.
pub struct Harness {
    pub ctx: AppContext,
    pub storage: Arc<MemoryStorage>,
    pub surface: StyleSurface,
    pub navigator: Arc<MemoryNavigator>,
    pub system: SystemPreference,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        Self::build(AppConfig::for_base_url(server.base_url()), Arc::new(MemoryStorage::new()), "/dashboard")
    }

    pub fn with_storage(server: &MockServer, storage: Arc<MemoryStorage>) -> Self {
        Self::build(AppConfig::for_base_url(server.base_url()), storage, "/dashboard")
    }

    pub fn build(config: AppConfig, storage: Arc<MemoryStorage>, route: &str) -> Self {
        let surface = StyleSurface::new();
        let navigator = Arc::new(MemoryNavigator::new(route));
        let system = SystemPreference::new(ColorScheme::Light);
        let ctx = AppContext::with_presentation(
            config,
            storage.clone(),
            navigator.clone(),
            Box::new(surface.clone()),
            system.clone(),
        )
        .expect("context");
        Self {
            ctx,
            storage,
            surface,
            navigator,
            system,
        }
    }
}

pub fn location(url: &str) -> Location {
    Location::parse(url).expect("valid url")
}

pub fn user_json() -> Value {
    json!({"id": 7, "name": "Ada Lovelace", "email": "ada@example.com", "role": "admin"})
}

pub fn user() -> User {
    serde_json::from_value(user_json()).expect("user")
}

pub fn tenant_json(id: &str) -> Value {
    json!({
        "data": {
            "id": id,
            "domain": format!("{}.app.com", id),
            "name": format!("{} Academy", id),
            "settings": {
                "branding": {"company_name": format!("{} Academy", id)}
            }
        }
    })
}

pub fn auth_json(token: &str, refresh: &str) -> Value {
    json!({
        "data": {
            "user": user_json(),
            "token": token,
            "refresh_token": refresh
        }
    })
}

/// Persist credentials the way a previous run would have left them
pub fn seed_credentials(storage: &MemoryStorage, token: &str, refresh: Option<&str>, with_user: bool) {
    storage.set(keys::AUTH_TOKEN, token).expect("seed token");
    if let Some(refresh) = refresh {
        storage.set(keys::REFRESH_TOKEN, refresh).expect("seed refresh token");
    }
    if with_user {
        storage.set_json(keys::USER, &user()).expect("seed user");
    }
}

/// Storage preloaded with credentials
pub fn seeded_storage(token: &str, refresh: Option<&str>, with_user: bool) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    seed_credentials(&storage, token, refresh, with_user);
    storage
}
