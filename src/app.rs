//! Application context: every service wired once, passed explicitly.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{ThemeError, TransportError};
use crate::session::{Hydration, SessionController, SessionStore};
use crate::storage::Storage;
use crate::tenant::{Location, TenantHandle, TenantResolver, TenantState};
use crate::theme::{
    theme_api_for, AppliedTheme, PreferenceSubscription, RenderSurface, StyleSurface, SystemPreference, ThemeConfig,
    ThemeEngine, ThemeMode, ThemeSource, ThemeStore,
};
use crate::transport::{ApiClient, Navigator};

/// What happened during boot
#[derive(Debug, Clone, Serialize)]
pub struct BootReport {
    #[serde(skip)]
    pub tenant: TenantState,
    pub tenant_id: Option<String>,
    pub stale: bool,
    pub theme: Option<AppliedTheme>,
    pub theme_source: Option<String>,
    pub theme_error: Option<String>,
    pub hydration: Hydration,
}

pub struct AppContext {
    config: AppConfig,
    storage: Arc<dyn Storage>,
    api: ApiClient,
    tenant: TenantResolver,
    session: SessionController,
    themes: ThemeStore,
    engine: ThemeEngine,
    preference: Mutex<Option<PreferenceSubscription>>,
}

impl AppContext {
    /// Context rendering into an in-memory surface, following `LMS_COLOR_SCHEME`
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, TransportError> {
        Self::with_presentation(
            config,
            storage,
            navigator,
            Box::new(StyleSurface::new()),
            SystemPreference::from_env(),
        )
    }

    pub fn with_presentation(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        navigator: Arc<dyn Navigator>,
        surface: Box<dyn RenderSurface>,
        system: SystemPreference,
    ) -> Result<Self, TransportError> {
        let handle = TenantHandle::default();
        let credentials = SessionStore::new(storage.clone());
        let api = ApiClient::new(&config, handle.clone(), credentials.clone(), navigator)?;

        let tenant = TenantResolver::new(api.clone(), storage.clone(), handle, config.tenant.clone());
        let session = SessionController::new(api.clone(), credentials);
        let themes = ThemeStore::new(theme_api_for(config.theme.backend, &api), storage.clone());
        let engine = ThemeEngine::new(surface, system);

        tracing::debug!("App context ready ({:?}, {})", config.environment, config.api.base_url);
        Ok(Self {
            config,
            storage,
            api,
            tenant,
            session,
            themes,
            engine,
            preference: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tenant(&self) -> &TenantResolver {
        &self.tenant
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn themes(&self) -> &ThemeStore {
        &self.themes
    }

    pub fn engine(&self) -> &ThemeEngine {
        &self.engine
    }

    /// Resolve the tenant, theme the surface, then re-hydrate auth.
    /// Auth never runs before the tenant has settled.
    pub async fn boot(&self, location: &Location) -> BootReport {
        let hydration = self.session.hydrate_when_ready(self.tenant.subscribe());
        let resolution = async {
            let state = self.tenant.resolve_tenant(location).await;
            let theme = self.apply_tenant_theme(&state).await;
            (state, theme)
        };
        let ((state, theme), hydration) = tokio::join!(resolution, hydration);

        self.watch_system_preference();

        let (theme, theme_source, theme_error) = match theme {
            Ok((applied, source)) => (Some(applied), Some(format!("{:?}", source).to_lowercase()), None),
            Err(e) => (self.engine.current(), None, Some(e.to_string())),
        };

        tracing::info!(
            "Boot finished: tenant={:?} hydration={:?}",
            state.config().map(|c| c.id.as_str()),
            hydration
        );
        BootReport {
            tenant_id: state.config().map(|c| c.id.clone()),
            stale: state.is_stale(),
            tenant: state,
            theme,
            theme_source,
            theme_error,
            hydration,
        }
    }

    /// Re-resolve the last location and re-theme for the result
    pub async fn reload_tenant(&self) -> Result<TenantState, ThemeError> {
        let state = self.tenant.refresh_tenant().await;
        self.apply_tenant_theme(&state).await?;
        Ok(state)
    }

    pub fn set_theme_mode(&self, mode: ThemeMode) -> Result<AppliedTheme, ThemeError> {
        self.themes.set_mode(mode)?;
        Ok(self.engine.set_mode(mode))
    }

    /// Save a theme for the current tenant and show it
    pub async fn save_theme(&self, theme: ThemeConfig) -> Result<AppliedTheme, ThemeError> {
        let state = self.tenant.state();
        let Some(config) = state.config() else {
            return Err(ThemeError::NoTenant);
        };
        let saved = self.themes.save(&config.id, &theme).await?;
        self.engine.apply_config(Some(config.id.clone()), saved, self.themes.mode())
    }

    /// Release listeners and reset the surface
    pub fn teardown(&self) {
        if let Ok(mut preference) = self.preference.lock() {
            preference.take();
        }
        self.engine.teardown();
        tracing::debug!("App context torn down");
    }

    fn watch_system_preference(&self) {
        if let Ok(mut preference) = self.preference.lock() {
            if preference.is_none() {
                *preference = Some(self.engine.watch_system_preference());
            }
        }
    }

    async fn apply_tenant_theme(&self, state: &TenantState) -> Result<(AppliedTheme, ThemeSource), ThemeError> {
        let mode = self.themes.mode();
        // A stale config keeps its theme; the tenant is still the same tenant.
        match state.config() {
            Some(config) => {
                let (theme, source) = self.themes.load(config).await;
                let applied = self.engine.apply_config(Some(config.id.clone()), theme, mode)?;
                Ok((applied, source))
            }
            None => {
                let applied = self.engine.apply_theme(None, mode)?;
                Ok((applied, ThemeSource::Default))
            }
        }
    }
}
