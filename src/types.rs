/// Shared wire types used across the codebase

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{data, meta?}` envelope returned by every remote endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Pagination metadata attached to list-shaped responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub last_page: u32,
}

impl PaginationMeta {
    pub fn has_next(&self) -> bool {
        self.current_page < self.last_page
    }
}

/// A decoded list page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub meta: Option<PaginationMeta>,
}

/// Authenticated user as returned by the current-user endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Value,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterData {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

/// Payload of login/register/refresh responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub user: Option<User>,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Pull a human-readable message out of an error body (`message` or `error`)
pub fn extract_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
