use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub routes: RoutesConfig,
    pub tenant: TenantOptions,
    pub theme: ThemeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request, the original send included
    pub max_attempts: u32,
    /// Seed of the exponential 5xx backoff
    pub base_delay_ms: u64,
    /// Constant delay between attempts after a network failure
    pub network_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    pub sign_in_route: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantOptions {
    /// Keep showing the last-known tenant config (marked stale) when a refetch fails
    pub serve_stale_on_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeBackend {
    Mock,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeSettings {
    pub backend: ThemeBackend,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn network_delay(&self) -> Duration {
        Duration::from_millis(self.network_delay_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    /// Development defaults pointed at an arbitrary base URL, with fast retries.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::development();
        config.api.base_url = base_url.into();
        config.retry.base_delay_ms = 5;
        config.retry.network_delay_ms = 5;
        config
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Ok(v) = env::var("LMS_API_URL") {
            self.api.base_url = v;
        }
        if let Ok(v) = env::var("LMS_API_TIMEOUT_SECS") {
            self.api.timeout_secs = v.parse().unwrap_or(self.api.timeout_secs);
        }
        if let Ok(v) = env::var("LMS_API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        // Retry overrides
        if let Ok(v) = env::var("LMS_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = v.parse().unwrap_or(self.retry.max_attempts);
        }
        if let Ok(v) = env::var("LMS_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = v.parse().unwrap_or(self.retry.base_delay_ms);
        }
        if let Ok(v) = env::var("LMS_RETRY_NETWORK_DELAY_MS") {
            self.retry.network_delay_ms = v.parse().unwrap_or(self.retry.network_delay_ms);
        }

        // Route overrides
        if let Ok(v) = env::var("LMS_SIGN_IN_ROUTE") {
            self.routes.sign_in_route = v;
        }

        // Tenant overrides
        if let Ok(v) = env::var("LMS_TENANT_SERVE_STALE") {
            self.tenant.serve_stale_on_error = v.parse().unwrap_or(self.tenant.serve_stale_on_error);
        }

        // Theme overrides
        match env::var("LMS_THEME_API").as_deref() {
            Ok("mock") => self.theme.backend = ThemeBackend::Mock,
            Ok("remote") => self.theme.backend = ThemeBackend::Remote,
            _ => {}
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                base_url: "http://localhost:8000/api".to_string(),
                timeout_secs: 30,
                enable_request_logging: true,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1000,
                network_delay_ms: 2000,
            },
            routes: RoutesConfig {
                sign_in_route: "/auth/sign-in".to_string(),
            },
            tenant: TenantOptions {
                serve_stale_on_error: false,
            },
            theme: ThemeSettings {
                backend: ThemeBackend::Mock,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                base_url: "https://staging-api.example.com/api".to_string(),
                timeout_secs: 15,
                enable_request_logging: true,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1000,
                network_delay_ms: 2000,
            },
            routes: RoutesConfig {
                sign_in_route: "/auth/sign-in".to_string(),
            },
            tenant: TenantOptions {
                serve_stale_on_error: true,
            },
            theme: ThemeSettings {
                backend: ThemeBackend::Remote,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                base_url: "https://api.example.com/api".to_string(),
                timeout_secs: 10,
                enable_request_logging: false,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1000,
                network_delay_ms: 2000,
            },
            routes: RoutesConfig {
                sign_in_route: "/auth/sign-in".to_string(),
            },
            tenant: TenantOptions {
                serve_stale_on_error: true,
            },
            theme: ThemeSettings {
                backend: ThemeBackend::Remote,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.theme.backend, ThemeBackend::Mock);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.api.enable_request_logging);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.theme.backend, ThemeBackend::Remote);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.api.base_url.starts_with("https://"));
    }

    #[test]
    fn test_for_base_url_uses_fast_retries() {
        let config = AppConfig::for_base_url("http://127.0.0.1:9");
        assert_eq!(config.api.base_url, "http://127.0.0.1:9");
        assert!(config.retry.base_delay() < Duration::from_millis(100));
    }
}
