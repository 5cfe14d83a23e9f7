//! Session/auth state and the refresh path the transport calls into.
//!
//! `SessionStore` is the credential holder: it owns the `auth_token`,
//! `refresh_token` and `user` keys and implements [`AuthHook`].
//! `SessionController` drives the remote auth endpoints on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};

use crate::error::{AuthError, TransportError};
use crate::storage::{keys, Storage, StorageExt};
use crate::tenant::TenantState;
use crate::transport::{ApiClient, ApiRequest, AuthHook};
use crate::types::{ApiEnvelope, AuthPayload, ChangePassword, Credentials, RegisterData, User};

const LOGIN_FAILED: &str = "Login failed. Please check your credentials and try again.";
const REGISTER_FAILED: &str = "Registration failed. Please try again.";
const FETCH_USER_FAILED: &str = "Could not load your account. Please sign in again.";
const CHANGE_PASSWORD_FAILED: &str = "Could not change your password. Please try again.";
const REFRESH_FAILED: &str = "Your session has expired. Please sign in again.";

/// Observable session state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }
}

/// Outcome of boot-time re-hydration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hydration {
    /// User and token both present
    Authenticated,
    /// No credentials to hydrate
    Anonymous,
    /// Tenant never resolved; auth left untouched
    TenantUnavailable,
    /// Stored token was rejected and the session cleared
    SignedOut,
}

/// Credential holder shared between the controller and the transport
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    state: watch::Sender<Session>,
    refresh_lock: Mutex<()>,
}

impl SessionStore {
    /// Build from persisted credentials
    pub fn new(storage: Arc<dyn Storage>) -> Arc<Self> {
        let (state, _) = watch::channel(Session::default());
        let store = Arc::new(Self {
            storage,
            state,
            refresh_lock: Mutex::new(()),
        });
        store.restore();
        store
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Reload token and user from storage. A user without a token is dropped.
    pub fn restore(&self) -> Session {
        let token = self.storage.get(keys::AUTH_TOKEN).ok().flatten();
        let mut user = self.storage.get_json::<User>(keys::USER).ok().flatten();

        if token.is_none() && user.is_some() {
            tracing::warn!("Persisted user without a token, discarding it");
            if let Err(e) = self.storage.remove(keys::USER) {
                tracing::warn!("Failed to clear orphaned user: {}", e);
            }
            user = None;
        }

        self.state.send_modify(|s| {
            s.token = token;
            s.user = user;
        });
        self.session()
    }

    fn refresh_credential(&self) -> Option<String> {
        self.storage.get(keys::REFRESH_TOKEN).ok().flatten()
    }

    /// Persist a complete credential set, then publish it in one step
    fn establish(&self, user: User, payload: &AuthPayload) -> Result<(), AuthError> {
        let persisted = self
            .storage
            .set(keys::AUTH_TOKEN, &payload.token)
            .and_then(|_| self.storage.set_json(keys::USER, &user))
            .and_then(|_| match &payload.refresh_token {
                Some(refresh) => self.storage.set(keys::REFRESH_TOKEN, refresh),
                None => self.storage.remove(keys::REFRESH_TOKEN),
            });
        if let Err(e) = persisted {
            tracing::error!("Failed to persist credentials: {}", e);
            self.clear();
            return Err(AuthError::Remote("Could not store your session".to_string()));
        }

        self.state.send_modify(|s| {
            s.user = Some(user);
            s.token = Some(payload.token.clone());
            s.error = None;
        });
        Ok(())
    }

    fn set_user(&self, user: User) {
        if let Err(e) = self.storage.set_json(keys::USER, &user) {
            tracing::warn!("Failed to persist user: {}", e);
        }
        self.state.send_modify(|s| s.user = Some(user));
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| {
            s.is_loading = loading;
            if loading {
                s.error = None;
            }
        });
    }

    fn fail(&self, message: String) {
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = Some(message);
        });
    }

    /// Drop every credential, persisted and in memory
    fn clear(&self) {
        for key in [keys::AUTH_TOKEN, keys::REFRESH_TOKEN, keys::USER] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!("Failed to clear '{}': {}", key, e);
            }
        }
        self.state.send_replace(Session::default());
    }

    async fn exchange(&self, client: &ApiClient, stale: Option<&str>) -> Result<String, AuthError> {
        let refresh_token = self.refresh_credential().ok_or(AuthError::MissingRefreshToken)?;
        let req = ApiRequest::new(Method::POST, "/auth/refresh")
            .json(&json!({ "refresh_token": refresh_token }))
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let value = client
            .send_direct(&req, stale)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;
        let payload = decode_payload(value).map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if stale == Some(payload.token.as_str()) {
            return Err(AuthError::RefreshFailed("refresh returned the same token".to_string()));
        }

        let persisted = self.storage.set(keys::AUTH_TOKEN, &payload.token).and_then(|_| {
            match &payload.refresh_token {
                Some(rotated) => self.storage.set(keys::REFRESH_TOKEN, rotated),
                None => Ok(()),
            }
        });
        if let Err(e) = persisted {
            return Err(AuthError::RefreshFailed(format!("could not persist token: {}", e)));
        }

        if let Some(user) = &payload.user {
            if let Err(e) = self.storage.set_json(keys::USER, user) {
                tracing::warn!("Failed to persist refreshed user: {}", e);
            }
        }
        self.state.send_modify(|s| {
            s.token = Some(payload.token.clone());
            if payload.user.is_some() {
                s.user = payload.user.clone();
            }
        });
        tracing::info!("Access token refreshed");
        Ok(payload.token)
    }
}

#[async_trait]
impl AuthHook for SessionStore {
    fn bearer_token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    /// Serialized: a caller that waited behind another refresh gets the token
    /// that refresh produced instead of exchanging again.
    async fn refresh(&self, client: &ApiClient, stale: Option<&str>) -> Result<String, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.bearer_token() {
            if Some(current.as_str()) != stale {
                tracing::debug!("Token already rotated by a concurrent refresh");
                return Ok(current);
            }
        }

        self.exchange(client, stale).await
    }

    fn invalidate(&self) {
        tracing::info!("Invalidating session credentials");
        self.clear();
    }
}

pub struct SessionController {
    api: ApiClient,
    store: Arc<SessionStore>,
}

impl SessionController {
    pub fn new(api: ApiClient, store: Arc<SessionStore>) -> Self {
        Self { api, store }
    }

    pub fn session(&self) -> Session {
        self.store.session()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn restore(&self) -> Session {
        self.store.restore()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<(), AuthError> {
        self.store.set_loading(true);
        let req = ApiRequest::new(Method::POST, "/auth/login")
            .json(credentials)
            .map(ApiRequest::without_auth_recovery);
        let result = self.authenticate(req, LOGIN_FAILED).await;
        if result.is_ok() {
            tracing::info!("Signed in as {}", credentials.email);
        }
        result
    }

    pub async fn register(&self, data: &RegisterData) -> Result<(), AuthError> {
        self.store.set_loading(true);
        let req = ApiRequest::new(Method::POST, "/auth/register")
            .json(data)
            .map(ApiRequest::without_auth_recovery);
        let result = self.authenticate(req, REGISTER_FAILED).await;
        if result.is_ok() {
            tracing::info!("Registered {}", data.email);
        }
        result
    }

    /// Best-effort remote sign-out; local credentials are always cleared
    pub async fn logout(&self) {
        if self.store.bearer_token().is_some() {
            let req = ApiRequest::new(Method::POST, "/auth/logout").without_auth_recovery();
            if let Err(e) = self.api.request::<Value>(req).await {
                tracing::warn!("Remote logout failed, clearing local session anyway: {}", e);
            }
        }
        self.store.clear();
        tracing::info!("Signed out");
    }

    /// Re-fetch the current user with the stored token
    pub async fn get_user(&self) -> Result<User, AuthError> {
        if self.store.bearer_token().is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        self.store.set_loading(true);
        match self.api.get::<ApiEnvelope<User>>("/auth/me").await {
            Ok(envelope) => {
                self.store.set_user(envelope.data.clone());
                self.store.set_loading(false);
                Ok(envelope.data)
            }
            Err(e) => Err(self.failed(e, FETCH_USER_FAILED)),
        }
    }

    pub async fn change_password(&self, change: &ChangePassword) -> Result<(), AuthError> {
        if self.store.bearer_token().is_none() {
            return Err(AuthError::NotAuthenticated);
        }
        self.store.set_loading(true);
        match self.api.post::<Value, _>("/auth/change-password", change).await {
            Ok(_) => {
                self.store.set_loading(false);
                tracing::info!("Password changed");
                Ok(())
            }
            Err(e) => Err(self.failed(e, CHANGE_PASSWORD_FAILED)),
        }
    }

    /// Explicit refresh. Any failure signs the user out.
    pub async fn refresh_token(&self) -> Result<(), AuthError> {
        let stale = self.store.bearer_token();
        match self.store.refresh(&self.api, stale.as_deref()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("Refresh failed, signing out: {}", e);
                self.logout().await;
                self.store.fail(REFRESH_FAILED.to_string());
                Err(e)
            }
        }
    }

    /// Wait for tenant resolution to settle, then re-hydrate the user if a
    /// token survived from a previous run. Never runs against an unresolved
    /// tenant.
    pub async fn hydrate_when_ready(&self, mut tenant: watch::Receiver<TenantState>) -> Hydration {
        let resolved = match tenant.wait_for(TenantState::is_terminal).await {
            Ok(state) => state.is_resolved(),
            Err(_) => false,
        };
        if !resolved {
            tracing::info!("Tenant unavailable, skipping session hydration");
            return Hydration::TenantUnavailable;
        }

        let session = self.session();
        if session.token.is_none() {
            return Hydration::Anonymous;
        }
        if session.user.is_some() {
            return Hydration::Authenticated;
        }

        match self.get_user().await {
            Ok(_) => Hydration::Authenticated,
            Err(e) => {
                tracing::warn!("Stored session rejected: {}", e);
                self.logout().await;
                Hydration::SignedOut
            }
        }
    }

    async fn authenticate(&self, req: Result<ApiRequest, TransportError>, fallback: &str) -> Result<(), AuthError> {
        let payload = match req {
            Ok(req) => self.api.request::<Value>(req).await.and_then(decode_payload),
            Err(e) => Err(e),
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => return Err(self.rejected(e, fallback)),
        };

        let user = match payload.user.clone() {
            Some(user) => user,
            None => {
                // Token without a user is never published; fetch the user first.
                let me = ApiRequest::new(Method::GET, "/auth/me");
                let fetched = self
                    .api
                    .send_direct(&me, Some(&payload.token))
                    .await
                    .and_then(|v| {
                        serde_json::from_value::<ApiEnvelope<User>>(v).map_err(|e| TransportError::Decode(e.to_string()))
                    });
                match fetched {
                    Ok(envelope) => envelope.data,
                    Err(e) => return Err(self.rejected(e, fallback)),
                }
            }
        };

        if let Err(e) = self.store.establish(user, &payload) {
            self.store.fail(e.to_string());
            return Err(e);
        }
        self.store.set_loading(false);
        Ok(())
    }

    /// A failed sign-in replaces whatever session was there before
    fn rejected(&self, e: TransportError, fallback: &str) -> AuthError {
        self.store.clear();
        self.failed(e, fallback)
    }

    /// Record a failure on the session and convert it
    fn failed(&self, e: TransportError, fallback: &str) -> AuthError {
        tracing::warn!("Auth request failed: {}", e);
        let message = display_message(&e, fallback);
        self.store.fail(message.clone());
        match e {
            TransportError::Auth(auth) => auth,
            TransportError::Status { status: 401 | 422, .. } => AuthError::InvalidCredentials(message),
            _ => AuthError::Remote(message),
        }
    }
}

/// Server-supplied message when there is one, otherwise `fallback`
fn display_message(e: &TransportError, fallback: &str) -> String {
    match e {
        TransportError::Status { message, .. } | TransportError::Forbidden(message) if !message.is_empty() => {
            message.clone()
        }
        _ => fallback.to_string(),
    }
}

fn decode_payload(value: Value) -> Result<AuthPayload, TransportError> {
    serde_json::from_value::<ApiEnvelope<AuthPayload>>(value)
        .map(|envelope| envelope.data)
        .map_err(|e| TransportError::Decode(e.to_string()))
}
