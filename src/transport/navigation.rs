use std::sync::RwLock;

/// Client-side router seam used for the sign-in redirect
pub trait Navigator: Send + Sync {
    fn current_route(&self) -> String;
    fn redirect(&self, route: &str);
}

/// Navigator that only tracks the current route and the redirects issued
#[derive(Debug)]
pub struct MemoryNavigator {
    current: RwLock<String>,
    redirects: RwLock<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(route.into()),
            redirects: RwLock::new(Vec::new()),
        }
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.read().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_route(&self) -> String {
        self.current.read().map(|r| r.clone()).unwrap_or_default()
    }

    fn redirect(&self, route: &str) {
        if let Ok(mut current) = self.current.write() {
            *current = route.to_string();
        }
        if let Ok(mut redirects) = self.redirects.write() {
            redirects.push(route.to_string());
        }
    }
}

/// Redirect to sign-in unless already there
pub fn redirect_to_sign_in(navigator: &dyn Navigator, sign_in_route: &str) -> bool {
    if navigator.current_route() == sign_in_route {
        return false;
    }
    tracing::info!("Redirecting to sign-in route {}", sign_in_route);
    navigator.redirect(sign_in_route);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_suppressed_on_sign_in_route() {
        let nav = MemoryNavigator::new("/auth/sign-in");
        assert!(!redirect_to_sign_in(&nav, "/auth/sign-in"));
        assert!(nav.redirects().is_empty());
    }

    #[test]
    fn test_redirect_from_dashboard() {
        let nav = MemoryNavigator::new("/dashboard/courses");
        assert!(redirect_to_sign_in(&nav, "/auth/sign-in"));
        assert_eq!(nav.current_route(), "/auth/sign-in");
        assert_eq!(nav.redirects(), vec!["/auth/sign-in".to_string()]);
    }
}
