//! Remote theme endpoints behind one strategy trait. The implementation is
//! picked once, when the app context is built.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use super::palette::{builtin_palettes, generate_palette, Palette};
use super::tokens::ThemeConfig;
use crate::config::ThemeBackend;
use crate::error::ThemeError;
use crate::transport::ApiClient;
use crate::types::ApiEnvelope;

#[async_trait]
pub trait ThemeApi: Send + Sync {
    /// Tenant's saved theme; `None` when the tenant never customized one
    async fn get_theme(&self, tenant_id: &str) -> Result<Option<ThemeConfig>, ThemeError>;

    async fn update_theme(&self, tenant_id: &str, theme: &ThemeConfig) -> Result<ThemeConfig, ThemeError>;

    async fn list_palettes(&self) -> Result<Vec<Palette>, ThemeError>;

    async fn generate_palette(&self, base_color: &str) -> Result<Palette, ThemeError>;
}

pub fn theme_api_for(backend: ThemeBackend, api: &ApiClient) -> Arc<dyn ThemeApi> {
    match backend {
        ThemeBackend::Mock => {
            tracing::debug!("Using in-memory theme API");
            Arc::new(MockThemeApi::new())
        }
        ThemeBackend::Remote => Arc::new(RemoteThemeApi::new(api.clone())),
    }
}

pub struct RemoteThemeApi {
    api: ApiClient,
}

impl RemoteThemeApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ThemeApi for RemoteThemeApi {
    async fn get_theme(&self, tenant_id: &str) -> Result<Option<ThemeConfig>, ThemeError> {
        let path = format!("/tenants/{}/theme", tenant_id);
        match self.api.get::<ApiEnvelope<Option<ThemeConfig>>>(&path).await {
            Ok(envelope) => Ok(envelope.data),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_theme(&self, tenant_id: &str, theme: &ThemeConfig) -> Result<ThemeConfig, ThemeError> {
        let path = format!("/tenants/{}/theme", tenant_id);
        let envelope: ApiEnvelope<ThemeConfig> = self.api.put(&path, theme).await?;
        Ok(envelope.data)
    }

    async fn list_palettes(&self) -> Result<Vec<Palette>, ThemeError> {
        let envelope: ApiEnvelope<Vec<Palette>> = self.api.get("/color-palettes").await?;
        Ok(envelope.data)
    }

    async fn generate_palette(&self, base_color: &str) -> Result<Palette, ThemeError> {
        let envelope: ApiEnvelope<Palette> = self
            .api
            .post("/color-palettes/generate", &json!({ "base_color": base_color }))
            .await?;
        Ok(envelope.data)
    }
}

/// In-memory backend for development and tests
#[derive(Debug, Default)]
pub struct MockThemeApi {
    themes: Mutex<HashMap<String, ThemeConfig>>,
}

impl MockThemeApi {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThemeApi for MockThemeApi {
    async fn get_theme(&self, tenant_id: &str) -> Result<Option<ThemeConfig>, ThemeError> {
        let themes = self.themes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(themes.get(tenant_id).cloned())
    }

    async fn update_theme(&self, tenant_id: &str, theme: &ThemeConfig) -> Result<ThemeConfig, ThemeError> {
        theme.validate()?;
        let mut themes = self.themes.lock().unwrap_or_else(|e| e.into_inner());
        themes.insert(tenant_id.to_string(), theme.clone());
        Ok(theme.clone())
    }

    async fn list_palettes(&self) -> Result<Vec<Palette>, ThemeError> {
        Ok(builtin_palettes())
    }

    async fn generate_palette(&self, base_color: &str) -> Result<Palette, ThemeError> {
        generate_palette("Custom", base_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_round_trip() {
        let api = MockThemeApi::new();
        assert!(api.get_theme("t-1").await.unwrap().is_none());

        let mut theme = ThemeConfig::default();
        theme.light.insert("primary".to_string(), "#000000".to_string());
        api.update_theme("t-1", &theme).await.unwrap();

        let saved = api.get_theme("t-1").await.unwrap().unwrap();
        assert_eq!(saved.light["primary"], "#000000");
        assert!(api.get_theme("t-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mock_rejects_asymmetric_theme() {
        let api = MockThemeApi::new();
        let mut theme = ThemeConfig::default();
        theme.dark.remove("primary");
        assert!(matches!(
            api.update_theme("t-1", &theme).await,
            Err(ThemeError::AsymmetricTokens(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_generates_palette() {
        let api = MockThemeApi::new();
        let palette = api.generate_palette("#16a34a").await.unwrap();
        assert_eq!(palette.colors["500"], "#16a34a");
        assert!(api.generate_palette("green").await.is_err());
    }
}
