use std::collections::BTreeMap;
use std::sync::Arc;

use super::api::ThemeApi;
use super::palette::Palette;
use super::tokens::{ThemeConfig, ThemeMode};
use crate::error::ThemeError;
use crate::storage::{keys, Storage, StorageExt};
use crate::tenant::TenantConfig;

type ThemeCache = BTreeMap<String, ThemeConfig>;

/// Where a loaded theme came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeSource {
    Tenant,
    Cache,
    Remote,
    Default,
}

/// Owns the per-tenant theme cache and the mode preference
pub struct ThemeStore {
    api: Arc<dyn ThemeApi>,
    storage: Arc<dyn Storage>,
}

impl ThemeStore {
    pub fn new(api: Arc<dyn ThemeApi>, storage: Arc<dyn Storage>) -> Self {
        Self { api, storage }
    }

    pub fn api(&self) -> &Arc<dyn ThemeApi> {
        &self.api
    }

    /// Theme for a tenant: the tenant's own config, then cache, then the theme
    /// endpoint, then the built-in default.
    pub async fn load(&self, tenant: &TenantConfig) -> (ThemeConfig, ThemeSource) {
        if let Some(theme) = tenant.theme() {
            if theme.validate().is_ok() {
                self.cache_insert(&tenant.id, theme);
                return (theme.clone(), ThemeSource::Tenant);
            }
            tracing::warn!("Tenant '{}' ships an asymmetric theme, ignoring it", tenant.id);
        }

        if let Some(theme) = self.cached(&tenant.id) {
            return (theme, ThemeSource::Cache);
        }

        match self.api.get_theme(&tenant.id).await {
            Ok(Some(theme)) if theme.validate().is_ok() => {
                self.cache_insert(&tenant.id, &theme);
                (theme, ThemeSource::Remote)
            }
            Ok(Some(_)) => {
                tracing::warn!("Remote theme for '{}' is asymmetric, using default", tenant.id);
                (ThemeConfig::default(), ThemeSource::Default)
            }
            Ok(None) => (ThemeConfig::default(), ThemeSource::Default),
            Err(e) => {
                tracing::warn!("Failed to load theme for '{}': {}", tenant.id, e);
                (ThemeConfig::default(), ThemeSource::Default)
            }
        }
    }

    /// Administrator update: persist remotely, then replace the cached copy
    pub async fn save(&self, tenant_id: &str, theme: &ThemeConfig) -> Result<ThemeConfig, ThemeError> {
        theme.validate()?;
        let saved = self.api.update_theme(tenant_id, theme).await?;
        self.cache_insert(tenant_id, &saved);
        tracing::info!("Saved theme for tenant '{}'", tenant_id);
        Ok(saved)
    }

    pub async fn palettes(&self) -> Result<Vec<Palette>, ThemeError> {
        self.api.list_palettes().await
    }

    pub async fn generate_palette(&self, base_color: &str) -> Result<Palette, ThemeError> {
        self.api.generate_palette(base_color).await
    }

    pub fn cached(&self, tenant_id: &str) -> Option<ThemeConfig> {
        self.cache().get(tenant_id).cloned()
    }

    pub fn invalidate(&self, tenant_id: &str) {
        let mut cache = self.cache();
        if cache.remove(tenant_id).is_some() {
            self.write_cache(&cache);
        }
    }

    /// Persisted mode preference, `System` when never chosen
    pub fn mode(&self) -> ThemeMode {
        self.storage
            .get_json::<ThemeMode>(keys::THEME_MODE)
            .ok()
            .flatten()
            .unwrap_or(ThemeMode::System)
    }

    pub fn set_mode(&self, mode: ThemeMode) -> Result<(), ThemeError> {
        self.storage.set_json(keys::THEME_MODE, &mode)?;
        Ok(())
    }

    fn cache(&self) -> ThemeCache {
        self.storage
            .get_json::<ThemeCache>(keys::TENANT_THEMES)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn cache_insert(&self, tenant_id: &str, theme: &ThemeConfig) {
        let mut cache = self.cache();
        cache.insert(tenant_id.to_string(), theme.clone());
        self.write_cache(&cache);
    }

    fn write_cache(&self, cache: &ThemeCache) {
        if let Err(e) = self.storage.set_json(keys::TENANT_THEMES, cache) {
            tracing::warn!("Failed to persist theme cache: {}", e);
        }
    }
}
