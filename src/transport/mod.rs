//! Resilient API transport.
//!
//! Every request is decorated with auth/tenant/diagnostic headers and then
//! driven through the recovery state machine in [`retry`]:
//! 401 refreshes once and replays, 403 surfaces immediately, 5xx and network
//! failures are retried within [`RetryPolicy`] bounds.

pub mod navigation;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AuthError, TransportError};
use crate::tenant::TenantHandle;
use crate::types::{extract_message, ApiEnvelope, Paginated};

pub use navigation::{MemoryNavigator, Navigator};
pub use retry::{RequestPhase, RequestTrace, RetryPolicy};

pub const HEADER_TENANT_ID: &str = "X-Tenant-ID";
pub const HEADER_TENANT_DOMAIN: &str = "X-Tenant-Domain";
pub const HEADER_REQUEST_TIME: &str = "X-Request-Time";

/// Session-side seam the transport uses for bearer tokens and 401 recovery
#[async_trait]
pub trait AuthHook: Send + Sync {
    /// Current bearer token, if any
    fn bearer_token(&self) -> Option<String>;

    /// Exchange the persisted refresh credential for a new bearer token.
    /// `stale` is the token the failing request carried.
    async fn refresh(&self, client: &ApiClient, stale: Option<&str>) -> Result<String, AuthError>;

    /// Recovery is impossible; drop all credentials.
    fn invalidate(&self);
}

/// Hook for clients that never authenticate
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

#[async_trait]
impl AuthHook for Anonymous {
    fn bearer_token(&self) -> Option<String> {
        None
    }

    async fn refresh(&self, _client: &ApiClient, _stale: Option<&str>) -> Result<String, AuthError> {
        Err(AuthError::MissingRefreshToken)
    }

    fn invalidate(&self) {}
}

/// A single logical request, before decoration
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// When false a 401 is returned to the caller instead of triggering refresh
    pub recover_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            recover_auth: true,
        }
    }

    /// For credential exchanges (login, register, logout) where a 401 means
    /// the credentials are wrong, not that the session expired
    pub fn without_auth_recovery(mut self) -> Self {
        self.recover_auth = false;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, TransportError> {
        let value = serde_json::to_value(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// Result of a single attempt, before the state machine decides what to do
enum Attempt {
    Success(Value),
    Unauthorized(String),
    Forbidden(String),
    ServerError { status: u16, message: String },
    Network(String),
    Undecodable(String),
    Other { status: u16, message: String, body: Option<Value> },
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    tenant: TenantHandle,
    auth: Arc<dyn AuthHook>,
    navigator: Arc<dyn Navigator>,
    sign_in_route: String,
    log_requests: bool,
}

/// Cheaply cloneable API client
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        config: &AppConfig,
        tenant: TenantHandle,
        auth: Arc<dyn AuthHook>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        // Validate once so later joins only fail on bad paths.
        url::Url::parse(&config.api.base_url)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: config.api.base_url.trim_end_matches('/').to_string(),
                policy: RetryPolicy::from(&config.retry),
                tenant,
                auth,
                navigator,
                sign_in_route: config.routes.sign_in_route.clone(),
                log_requests: config.api.enable_request_logging,
            }),
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    pub fn tenant(&self) -> &TenantHandle {
        &self.inner.tenant
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        self.request(ApiRequest::new(Method::GET, path)).await
    }

    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let mut req = ApiRequest::new(Method::GET, path);
        for (k, v) in query {
            req = req.query(*k, *v);
        }
        self.request(req).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        self.request(ApiRequest::new(Method::POST, path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        self.request(ApiRequest::new(Method::PUT, path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        self.request(ApiRequest::new(Method::PATCH, path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        self.request(ApiRequest::new(Method::DELETE, path)).await
    }

    /// GET a `{data, meta?}` envelope
    pub async fn get_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiEnvelope<T>, TransportError> {
        self.get(path).await
    }

    /// GET one page of a list resource (courses, users, categories, ...)
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Paginated<T>, TransportError> {
        let page = page.to_string();
        let per_page = per_page.to_string();
        let envelope: ApiEnvelope<Vec<T>> = self
            .get_query(path, &[("page", page.as_str()), ("per_page", per_page.as_str())])
            .await?;
        Ok(Paginated {
            items: envelope.data,
            meta: envelope.meta,
        })
    }

    /// Execute with full recovery and decode the body into `T`
    pub async fn request<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, TransportError> {
        let (result, _trace) = self.execute_traced(req).await;
        let value = result?;
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Execute with full recovery, returning the raw body and what happened on the way
    pub async fn execute_traced(&self, req: ApiRequest) -> (Result<Value, TransportError>, RequestTrace) {
        let span = tracing::debug_span!(
            "api_request",
            method = %req.method,
            path = %req.path,
            request_id = %Uuid::new_v4().simple()
        );
        self.run_state_machine(req).instrument(span).await
    }

    async fn run_state_machine(&self, req: ApiRequest) -> (Result<Value, TransportError>, RequestTrace) {
        let policy = self.inner.policy;
        let mut trace = RequestTrace::default();
        let mut token = self.inner.auth.bearer_token();

        loop {
            trace.enter(RequestPhase::Sent);
            trace.attempts += 1;
            if self.inner.log_requests {
                tracing::debug!("Attempt {} for {} {}", trace.attempts, req.method, req.path);
            }

            match self.attempt(&req, token.as_deref()).await {
                Attempt::Success(value) => {
                    trace.enter(RequestPhase::Completed);
                    return (Ok(value), trace);
                }
                Attempt::Unauthorized(message) => {
                    trace.enter(RequestPhase::Failed401);
                    if !req.recover_auth {
                        trace.enter(RequestPhase::Failed);
                        return (
                            Err(TransportError::Status {
                                status: 401,
                                message,
                                body: None,
                            }),
                            trace,
                        );
                    }
                    if trace.retried {
                        tracing::warn!("Replayed request still unauthorized: {}", message);
                        self.unrecoverable();
                        trace.enter(RequestPhase::Failed);
                        return (Err(AuthError::SessionExpired.into()), trace);
                    }
                    trace.retried = true;
                    trace.enter(RequestPhase::Refreshing);
                    trace.refreshes += 1;
                    match self.inner.auth.refresh(self, token.as_deref()).await {
                        Ok(fresh) => {
                            token = Some(fresh);
                            trace.enter(RequestPhase::Replayed);
                        }
                        Err(e) => {
                            tracing::warn!("Token refresh failed: {}", e);
                            self.unrecoverable();
                            trace.enter(RequestPhase::Failed);
                            return (Err(e.into()), trace);
                        }
                    }
                }
                Attempt::Forbidden(message) => {
                    trace.enter(RequestPhase::Failed);
                    return (Err(TransportError::Forbidden(message)), trace);
                }
                Attempt::ServerError { status, message } => {
                    trace.enter(RequestPhase::Failed5xx);
                    if !trace.retried && policy.allows_another(trace.attempts) {
                        let retry = trace.attempts;
                        let delay = policy.server_error_delay(retry);
                        tracing::warn!("Server error {} on {}, retry {} in {:?}", status, req.path, retry, delay);
                        trace.enter(RequestPhase::Retrying(retry));
                        trace.delays.push(delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!("Server error {} on {} after {} attempts", status, req.path, trace.attempts);
                    trace.enter(RequestPhase::Failed);
                    return (Err(TransportError::Server { status, message }), trace);
                }
                Attempt::Network(message) => {
                    trace.enter(RequestPhase::NetworkFailed);
                    if !trace.retried && policy.allows_another(trace.attempts) {
                        let retry = trace.attempts;
                        let delay = policy.network_error_delay(retry);
                        tracing::warn!("Network error on {}, retry {} in {:?}: {}", req.path, retry, delay, message);
                        trace.enter(RequestPhase::Retrying(retry));
                        trace.delays.push(delay);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    tracing::error!("Network error on {} after {} attempts: {}", req.path, trace.attempts, message);
                    trace.enter(RequestPhase::Failed);
                    return (Err(TransportError::Network(message)), trace);
                }
                Attempt::Undecodable(message) => {
                    trace.enter(RequestPhase::Failed);
                    return (Err(TransportError::Decode(message)), trace);
                }
                Attempt::Other { status, message, body } => {
                    trace.enter(RequestPhase::Failed);
                    return (Err(TransportError::Status { status, message, body }), trace);
                }
            }
        }
    }

    /// One decorated attempt with no recovery at all. Used for the refresh
    /// exchange itself so it can never recurse into the 401 path.
    pub async fn send_direct(&self, req: &ApiRequest, bearer: Option<&str>) -> Result<Value, TransportError> {
        match self.attempt(req, bearer).await {
            Attempt::Success(value) => Ok(value),
            Attempt::Unauthorized(message) => Err(TransportError::Status {
                status: 401,
                message,
                body: None,
            }),
            Attempt::Forbidden(message) => Err(TransportError::Forbidden(message)),
            Attempt::ServerError { status, message } => Err(TransportError::Server { status, message }),
            Attempt::Network(message) => Err(TransportError::Network(message)),
            Attempt::Undecodable(message) => Err(TransportError::Decode(message)),
            Attempt::Other { status, message, body } => Err(TransportError::Status { status, message, body }),
        }
    }

    fn unrecoverable(&self) {
        self.inner.auth.invalidate();
        navigation::redirect_to_sign_in(self.inner.navigator.as_ref(), &self.inner.sign_in_route);
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    async fn attempt(&self, req: &ApiRequest, bearer: Option<&str>) -> Attempt {
        let url = match url::Url::parse(&self.url_for(&req.path)) {
            Ok(url) => url,
            Err(e) => return Attempt::Undecodable(format!("invalid request URL: {}", e)),
        };

        let mut builder = self
            .inner
            .http
            .request(req.method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(HEADER_REQUEST_TIME, Utc::now().to_rfc3339());

        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(tenant) = self.inner.tenant.current() {
            builder = builder
                .header(HEADER_TENANT_ID, tenant.id)
                .header(HEADER_TENANT_DOMAIN, tenant.domain);
        }
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Network(e.to_string()),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Attempt::Network(e.to_string()),
        };
        let body: Option<Value> = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        if status.is_success() {
            return match body {
                Some(value) => Attempt::Success(value),
                None if text.trim().is_empty() => Attempt::Success(Value::Null),
                None => Attempt::Undecodable(format!("{} response body is not JSON", status.as_u16())),
            };
        }

        let message = body
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

        match status.as_u16() {
            401 => Attempt::Unauthorized(message),
            403 => Attempt::Forbidden(message),
            code if code >= 500 => Attempt::ServerError { status: code, message },
            code => Attempt::Other {
                status: code,
                message,
                body,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> ApiClient {
        let config = AppConfig::for_base_url(server.base_url());
        ApiClient::new(
            &config,
            TenantHandle::default(),
            Arc::new(Anonymous),
            Arc::new(MemoryNavigator::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_headers_on_every_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .header("accept", "application/json")
                .header("content-type", "application/json")
                .header_exists("x-request-time");
            then.status(200).json_body(json!({"data": []}));
        });

        let client = client_for(&server);
        let body: Value = client.get("/courses").await.unwrap();
        assert_eq!(body, json!({"data": []}));
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(DELETE).path("/users/7");
            then.status(403).json_body(json!({"message": "Not allowed"}));
        });

        let client = client_for(&server);
        let (result, trace) = client
            .execute_traced(ApiRequest::new(reqwest::Method::DELETE, "/users/7")).await;
        match result {
            Err(TransportError::Forbidden(message)) => assert_eq!(message, "Not allowed"),
            other => panic!("expected forbidden, got {:?}", other),
        }
        assert_eq!(trace.attempts, 1);
        assert_eq!(trace.refreshes, 0);
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_client_errors_pass_through() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/categories");
            then.status(422).json_body(json!({"message": "The name field is required."}));
        });

        let client = client_for(&server);
        let err = client
            .post::<Value, _>("/categories", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(422));
        assert_eq!(err.user_message(), "The name field is required.");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_empty_success_body_is_null() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/categories/3");
            then.status(204);
        });

        let client = client_for(&server);
        let body: Value = client.delete("/categories/3").await.unwrap();
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_list_decodes_pagination() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/courses")
                .query_param("page", "2")
                .query_param("per_page", "10");
            then.status(200).json_body(json!({
                "data": [{"id": 11}, {"id": 12}],
                "meta": {"current_page": 2, "per_page": 10, "total": 12, "last_page": 2}
            }));
        });

        let client = client_for(&server);
        let page: Paginated<Value> = client.list("/courses", 2, 10).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.meta.unwrap().has_next());
    }
}
