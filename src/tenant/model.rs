use serde::{Deserialize, Serialize};

use crate::theme::ThemeConfig;

/// Tenant configuration as served by the remote system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: TenantSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    #[serde(default)]
    pub branding: Branding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_config: Option<ThemeConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
}

impl TenantConfig {
    pub fn identity(&self) -> TenantIdentity {
        TenantIdentity {
            id: self.id.clone(),
            domain: self.domain.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.settings
            .branding
            .company_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn theme(&self) -> Option<&ThemeConfig> {
        self.settings.theme_config.as_ref()
    }
}

/// What the transport needs to scope a request to a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub id: String,
    pub domain: String,
}

/// Shape of the `current_tenant` storage key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTenant {
    /// Identifier the tenant was resolved by (subdomain label, path segment, ...)
    pub identifier: String,
    #[serde(flatten)]
    pub config: TenantConfig,
}
