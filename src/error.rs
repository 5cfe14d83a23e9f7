// Client-side error taxonomy
use thiserror::Error;

/// Failures reading or writing persisted client state
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Authentication failures. Terminal for the session unless raised on the
/// first 401-retry path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("No refresh credential available")]
    MissingRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Remote(String),
}

/// Transport failures surfaced after the client's own recovery is exhausted
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

impl TransportError {
    /// HTTP status, when the failure carried one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Server { status, .. } => Some(*status),
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Forbidden(_) => Some(403),
            TransportError::Auth(_) => Some(401),
            _ => None,
        }
    }

    /// Server-supplied message, if the response body had one
    pub fn server_message(&self) -> Option<&str> {
        match self {
            TransportError::Server { message, .. }
            | TransportError::Status { message, .. }
            | TransportError::Forbidden(message) => Some(message.as_str()),
            _ => None,
        }
    }

    /// Message safe to show to an end user. Transient failures never leak
    /// internals.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Network(_) => {
                "Unable to reach the server. Please check your connection and try again.".to_string()
            }
            TransportError::Server { .. } | TransportError::Decode(_) | TransportError::Url(_) => {
                "Something went wrong. Please try again later.".to_string()
            }
            TransportError::Forbidden(_) => "You do not have permission to perform this action.".to_string(),
            TransportError::Auth(_) => "Your session has expired. Please sign in again.".to_string(),
            TransportError::Status { message, .. } => message.clone(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

/// Tenant resolution failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("No tenant could be determined from the current location")]
    NoSignal,

    #[error("Tenant '{0}' not found")]
    NotFound(String),

    #[error("Failed to load tenant configuration: {0}")]
    Fetch(String),

    #[error("Invalid tenant identifier: {0}")]
    InvalidIdentifier(String),
}

/// Theme configuration and theme API failures
#[derive(Error, Debug)]
pub enum ThemeError {
    #[error("Theme token sets are asymmetric: {0}")]
    AsymmetricTokens(String),

    #[error("Invalid color token key: {0}")]
    InvalidTokenKey(String),

    #[error("Invalid color value: {0}")]
    InvalidColor(String),

    #[error("Theme API error: {0}")]
    Api(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No tenant resolved")]
    NoTenant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_hide_internals() {
        let err = TransportError::Server {
            status: 502,
            message: "upstream pool exhausted at db-3".to_string(),
        };
        assert!(!err.user_message().contains("db-3"));
        assert_eq!(err.status_code(), Some(502));

        let err = TransportError::Network("connection refused (os error 111)".to_string());
        assert!(!err.user_message().contains("os error"));
    }

    #[test]
    fn test_status_errors_keep_server_message() {
        let err = TransportError::Status {
            status: 422,
            message: "The name field is required.".to_string(),
            body: None,
        };
        assert_eq!(err.user_message(), "The name field is required.");
        assert_eq!(err.server_message(), Some("The name field is required."));
    }
}
