//! Tenant identity signals and their precedence.
//!
//! subdomain > `/tenant/<name>` path > `?tenant=<name>` query > persisted.
//! The first present, valid signal wins; signals are never merged.

use serde::{Deserialize, Serialize};
use url::{Host, Url};

pub const PATH_PREFIX: &str = "tenant";
pub const QUERY_PARAM: &str = "tenant";
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantSignal {
    Subdomain,
    Path,
    Query,
    Persisted,
}

/// Where the app is currently running: the parts of a URL the resolver reads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub host: Option<String>,
    pub is_ip: bool,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Location {
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(&Url::parse(input)?))
    }

    pub fn from_url(url: &Url) -> Self {
        let (host, is_ip) = match url.host() {
            Some(Host::Domain(domain)) => (Some(domain.to_ascii_lowercase()), false),
            Some(Host::Ipv4(ip)) => (Some(ip.to_string()), true),
            Some(Host::Ipv6(ip)) => (Some(ip.to_string()), true),
            None => (None, false),
        };
        Self {
            host,
            is_ip,
            path: url.path().to_string(),
            query: url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedTenant {
    pub identifier: String,
    pub signal: TenantSignal,
}

pub fn is_valid_identifier(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_IDENTIFIER_LEN
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Leading label of the host, when the host actually carries a tenant label
pub fn subdomain_of(location: &Location) -> Option<String> {
    if location.is_ip {
        return None;
    }
    let host = location.host.as_deref()?;
    if host == "localhost" {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    let candidate = match labels.as_slice() {
        // acme.localhost during development
        [first, "localhost"] => *first,
        [first, _, _, ..] => *first,
        _ => return None,
    };

    if candidate == "www" {
        return None;
    }
    Some(candidate.to_string())
}

/// `<name>` from a `/tenant/<name>/...` path
pub fn path_tenant(path: &str) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(PATH_PREFIX), Some(name)) => Some(name.to_string()),
        _ => None,
    }
}

pub fn query_tenant(query: &[(String, String)]) -> Option<String> {
    query
        .iter()
        .find(|(k, _)| k == QUERY_PARAM)
        .map(|(_, v)| v.trim().to_string())
}

/// Pick the highest-precedence valid signal
pub fn detect_tenant(location: &Location, persisted: Option<&str>) -> Option<DetectedTenant> {
    let candidates = [
        (TenantSignal::Subdomain, subdomain_of(location)),
        (TenantSignal::Path, path_tenant(&location.path)),
        (TenantSignal::Query, query_tenant(&location.query)),
        (TenantSignal::Persisted, persisted.map(str::to_string)),
    ];

    candidates.into_iter().find_map(|(signal, candidate)| {
        let identifier = candidate?;
        if is_valid_identifier(&identifier) {
            Some(DetectedTenant { identifier, signal })
        } else {
            tracing::debug!("Ignoring invalid {:?} tenant signal '{}'", signal, identifier);
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(url: &str, persisted: Option<&str>) -> Option<DetectedTenant> {
        detect_tenant(&Location::parse(url).unwrap(), persisted)
    }

    #[test]
    fn test_subdomain_resolves() {
        let found = detect("https://acme.app.com/dashboard", None).unwrap();
        assert_eq!(found.identifier, "acme");
        assert_eq!(found.signal, TenantSignal::Subdomain);
    }

    #[test]
    fn test_path_resolves_without_subdomain() {
        let found = detect("https://app.com/tenant/acme/courses", None).unwrap();
        assert_eq!(found.identifier, "acme");
        assert_eq!(found.signal, TenantSignal::Path);
    }

    #[test]
    fn test_subdomain_beats_query() {
        let found = detect("https://acme.app.com/?tenant=globex", Some("initech")).unwrap();
        assert_eq!(found.identifier, "acme");
        assert_eq!(found.signal, TenantSignal::Subdomain);
    }

    #[test]
    fn test_path_beats_query_and_persisted() {
        let found = detect("https://app.com/tenant/acme?tenant=globex", Some("initech")).unwrap();
        assert_eq!(found.identifier, "acme");
    }

    #[test]
    fn test_query_then_persisted() {
        let found = detect("http://localhost:5173/?tenant=globex", Some("initech")).unwrap();
        assert_eq!((found.identifier.as_str(), found.signal), ("globex", TenantSignal::Query));

        let found = detect("http://localhost:5173/", Some("initech")).unwrap();
        assert_eq!((found.identifier.as_str(), found.signal), ("initech", TenantSignal::Persisted));
    }

    #[test]
    fn test_excluded_hosts() {
        assert!(detect("http://localhost:3000/", None).is_none());
        assert!(detect("https://www.app.com/", None).is_none());
        assert!(detect("http://192.168.1.20:8080/", None).is_none());
        assert!(detect("http://[::1]:8080/", None).is_none());
        assert!(detect("https://app.com/", None).is_none());
    }

    #[test]
    fn test_dev_localhost_subdomain() {
        let found = detect("http://acme.localhost:5173/", None).unwrap();
        assert_eq!(found.identifier, "acme");
    }

    #[test]
    fn test_invalid_signal_falls_through() {
        let found = detect("https://app.com/?tenant=", Some("initech")).unwrap();
        assert_eq!(found.signal, TenantSignal::Persisted);

        let found = detect("https://app.com/tenant/bad%20name?tenant=globex", None).unwrap();
        assert_eq!(found.identifier, "globex");
    }
}
