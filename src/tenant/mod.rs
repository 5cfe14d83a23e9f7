//! Tenant resolution.
//!
//! `Uninitialized -> Resolving -> {Resolved, NotFound, Error}`. A resolution
//! never invents a default tenant: with no signal the terminal state is
//! `NotFound`.

pub mod model;
pub mod signals;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;

use crate::config::TenantOptions;
use crate::error::TenantError;
use crate::storage::{keys, Storage, StorageExt};
use crate::transport::ApiClient;
use crate::types::ApiEnvelope;

pub use model::{Branding, PersistedTenant, TenantConfig, TenantIdentity, TenantSettings};
pub use signals::{detect_tenant, DetectedTenant, Location, TenantSignal};

/// Shared, read-only view of the resolved tenant for request decoration
#[derive(Debug, Clone, Default)]
pub struct TenantHandle {
    inner: Arc<RwLock<Option<TenantIdentity>>>,
}

impl TenantHandle {
    /// A handle pinned to one tenant, for clients that skip resolution
    pub fn fixed(identity: TenantIdentity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(identity))),
        }
    }

    pub fn current(&self) -> Option<TenantIdentity> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    fn set(&self, identity: Option<TenantIdentity>) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = identity;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Last-known config shown because the latest fetch failed
    Stale { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TenantState {
    Uninitialized,
    Resolving,
    Resolved {
        config: Arc<TenantConfig>,
        signal: TenantSignal,
        freshness: Freshness,
    },
    NotFound {
        identifier: Option<String>,
    },
    Error {
        message: String,
        stale: Option<Arc<TenantConfig>>,
    },
}

impl TenantState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, TenantState::Resolved { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TenantState::Uninitialized | TenantState::Resolving)
    }

    /// Config to render with: the resolved one, or the stale one kept across an error
    pub fn config(&self) -> Option<&Arc<TenantConfig>> {
        match self {
            TenantState::Resolved { config, .. } => Some(config),
            TenantState::Error { stale, .. } => stale.as_ref(),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            TenantState::Resolved {
                freshness: Freshness::Stale { .. },
                ..
            } | TenantState::Error { stale: Some(_), .. }
        )
    }

    pub fn error(&self) -> Option<TenantError> {
        match self {
            TenantState::NotFound { identifier: None } => Some(TenantError::NoSignal),
            TenantState::NotFound { identifier: Some(id) } => Some(TenantError::NotFound(id.clone())),
            TenantState::Error { message, .. } => Some(TenantError::Fetch(message.clone())),
            _ => None,
        }
    }

    /// Hints to show next to the retry affordance
    pub fn guidance(&self) -> Vec<&'static str> {
        match self {
            TenantState::NotFound { identifier: None } => vec![
                "Open the dashboard through your organization's address (e.g. acme.example.com)",
                "Or use /tenant/<name> or ?tenant=<name> in the URL",
            ],
            TenantState::NotFound { identifier: Some(_) } => vec![
                "Check that the tenant name in the URL is spelled correctly",
                "Confirm the tenant exists and is active",
            ],
            TenantState::Error { .. } => vec![
                "Check your network connection",
                "Check that the tenant name in the URL is correct",
                "Retry; if the problem persists contact support",
            ],
            _ => Vec::new(),
        }
    }
}

pub struct TenantResolver {
    api: ApiClient,
    storage: Arc<dyn Storage>,
    handle: TenantHandle,
    options: TenantOptions,
    state: watch::Sender<TenantState>,
    issued: AtomicU64,
    last_location: Mutex<Option<Location>>,
    last_known: Mutex<Option<(String, Arc<TenantConfig>)>>,
}

impl TenantResolver {
    pub fn new(api: ApiClient, storage: Arc<dyn Storage>, handle: TenantHandle, options: TenantOptions) -> Self {
        let (state, _) = watch::channel(TenantState::Uninitialized);

        // Last session's tenant is the stale fallback until a fetch succeeds.
        let last_known = storage
            .get_json::<PersistedTenant>(keys::CURRENT_TENANT)
            .ok()
            .flatten()
            .map(|p| (p.identifier, Arc::new(p.config)));

        Self {
            api,
            storage,
            handle,
            options,
            state,
            issued: AtomicU64::new(0),
            last_location: Mutex::new(None),
            last_known: Mutex::new(last_known),
        }
    }

    pub fn state(&self) -> TenantState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TenantState> {
        self.state.subscribe()
    }

    pub fn handle(&self) -> &TenantHandle {
        &self.handle
    }

    /// Identifier persisted by the last successful resolution
    pub fn persisted_identifier(&self) -> Option<String> {
        self.storage
            .get_json::<PersistedTenant>(keys::CURRENT_TENANT)
            .ok()
            .flatten()
            .map(|p| p.identifier)
    }

    /// Resolve the tenant for `location` and fetch its configuration
    pub async fn resolve_tenant(&self, location: &Location) -> TenantState {
        if let Ok(mut last) = self.last_location.lock() {
            *last = Some(location.clone());
        }

        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(TenantState::Resolving);

        let persisted = self.persisted_identifier();
        let Some(detected) = detect_tenant(location, persisted.as_deref()) else {
            tracing::info!("No tenant signal in location {:?}", location.host);
            self.handle.set(None);
            return self.publish(TenantState::NotFound { identifier: None });
        };

        tracing::debug!("Resolving tenant '{}' from {:?}", detected.identifier, detected.signal);
        // The config fetch for a different tenant must not carry the previous tenant's headers.
        let switching = self
            .last_known
            .lock()
            .ok()
            .map_or(true, |last| last.as_ref().map(|(id, _)| id) != Some(&detected.identifier));
        if switching {
            self.handle.set(None);
        }

        let path = format!("/tenants/{}/config", detected.identifier);
        let result = self.api.get::<ApiEnvelope<TenantConfig>>(&path).await;

        if seq != self.issued.load(Ordering::SeqCst) {
            tracing::debug!("Discarding superseded tenant resolution #{}", seq);
            return self.state();
        }

        match result {
            Ok(envelope) => self.on_resolved(detected, envelope.data),
            Err(e) if e.is_not_found() => {
                tracing::warn!("Tenant '{}' does not exist", detected.identifier);
                self.handle.set(None);
                self.publish(TenantState::NotFound {
                    identifier: Some(detected.identifier),
                })
            }
            Err(e) => {
                tracing::error!("Failed to fetch tenant '{}': {}", detected.identifier, e);
                self.on_fetch_failed(&detected, e.to_string())
            }
        }
    }

    /// Re-run resolution against the last location, restarting from `Resolving`
    pub async fn refresh_tenant(&self) -> TenantState {
        let location = self
            .last_location
            .lock()
            .ok()
            .and_then(|last| last.clone())
            .unwrap_or_default();
        self.resolve_tenant(&location).await
    }

    /// Forget the persisted tenant and return to `Uninitialized`
    pub fn clear_tenant(&self) -> TenantState {
        self.issued.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.storage.remove(keys::CURRENT_TENANT) {
            tracing::warn!("Failed to clear persisted tenant: {}", e);
        }
        if let Ok(mut last) = self.last_known.lock() {
            *last = None;
        }
        self.handle.set(None);
        self.publish(TenantState::Uninitialized)
    }

    fn on_resolved(&self, detected: DetectedTenant, config: TenantConfig) -> TenantState {
        let config = Arc::new(config);
        let persisted = PersistedTenant {
            identifier: detected.identifier.clone(),
            config: (*config).clone(),
        };
        if let Err(e) = self.storage.set_json(keys::CURRENT_TENANT, &persisted) {
            tracing::warn!("Failed to persist tenant '{}': {}", detected.identifier, e);
        }
        if let Ok(mut last) = self.last_known.lock() {
            *last = Some((detected.identifier.clone(), config.clone()));
        }
        self.handle.set(Some(config.identity()));
        tracing::info!("Resolved tenant '{}' ({})", detected.identifier, config.domain);

        self.publish(TenantState::Resolved {
            config,
            signal: detected.signal,
            freshness: Freshness::Fresh,
        })
    }

    fn on_fetch_failed(&self, detected: &DetectedTenant, message: String) -> TenantState {
        let last_known = self.last_known.lock().ok().and_then(|last| last.clone());

        // Stale config is only ever shown for the same tenant that was requested.
        let same_tenant = last_known
            .as_ref()
            .filter(|(identifier, _)| *identifier == detected.identifier)
            .map(|(_, config)| config.clone());

        match same_tenant {
            Some(config) if self.options.serve_stale_on_error => {
                self.handle.set(Some(config.identity()));
                self.publish(TenantState::Resolved {
                    config,
                    signal: detected.signal,
                    freshness: Freshness::Stale { reason: message },
                })
            }
            Some(config) => {
                self.handle.set(Some(config.identity()));
                self.publish(TenantState::Error {
                    message,
                    stale: Some(config),
                })
            }
            None => {
                self.handle.set(None);
                self.publish(TenantState::Error { message, stale: None })
            }
        }
    }

    fn publish(&self, state: TenantState) -> TenantState {
        self.state.send_replace(state.clone());
        state
    }
}
