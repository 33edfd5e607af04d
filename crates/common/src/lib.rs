// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! exchanged between the classroom web client and the login proxy.
//! This module defines the JSON bodies of the proxy's HTTP surface.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of `POST /login`.
///
/// Both fields are optional on the wire so that a missing field is reported
/// as a bad request rather than a malformed body. Numbers are accepted too,
/// since student IDs are often sent unquoted.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LoginRequest {
    #[serde(default, deserialize_with = "string_or_number")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub password: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or a number, found {other}"
        ))),
    }
}

/// How the credential payload is encoded on an upstream request
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded; charset=UTF-8`
    Form,
}

impl Encoding {
    /// Encodings in the order they are tried for every payload.
    pub const ORDER: [Encoding; 2] = [Encoding::Json, Encoding::Form];

    /// Value of the `Content-Type` header sent with this encoding
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::Form => "application/x-www-form-urlencoded; charset=UTF-8",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Form => "form",
        }
    }
}

/// A (username field name, password field name) pair.
///
/// Serialized as a two element array, e.g. `["studentId", "pwd"]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldPair(pub String, pub String);

impl FieldPair {
    pub fn new(username_field: impl Into<String>, password_field: impl Into<String>) -> Self {
        Self(username_field.into(), password_field.into())
    }

    pub fn username_field(&self) -> &str {
        &self.0
    }

    pub fn password_field(&self) -> &str {
        &self.1
    }
}

/// What happened to a single upstream try
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// The upstream answered with an HTTP response
    Response,
    /// No response within the per-attempt timeout
    Timeout,
    /// Connection, TLS or redirect failure
    Transport,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Response => "response",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Transport => "transport",
        }
    }
}

/// Diagnostic trace of one upstream HTTP try
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub url: String,
    /// Absent when no response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub content_type: String,
    pub body_preview: String,
    pub request_header_names: Vec<String>,
    pub encoding: Encoding,
    pub field_pair: FieldPair,
    pub outcome: AttemptOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    /// True for a 401 or 403 response
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.http_status, Some(401 | 403))
    }

    pub fn is_not_found(&self) -> bool {
        self.http_status == Some(404)
    }
}

/// Failure body returned by `POST /login`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FailureBody {
    /// Always `true`
    pub error: bool,
    /// Mirrors the HTTP status of the response
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Which static credential header is attached to upstream calls
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    #[serde(rename = "X-API-KEY")]
    ApiKey,
    Bearer,
    None,
}

/// Body of `GET /login/config`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub ok: bool,
    pub info: ConfigInfo,
}

/// Resolved configuration, without secrets
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInfo {
    pub base: String,
    pub paths: Vec<String>,
    pub field_pairs: Vec<FieldPair>,
    pub header_mode: HeaderMode,
    /// `base + path` for every candidate path
    pub url_preview: Vec<String>,
    /// URL actually dispatched to for every candidate path
    pub dispatch_urls: Vec<String>,
    pub pinned_path: Option<String>,
    pub verbose: bool,
}

/// Who signed in, as far as the upstream success payload tells.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub user: Value,
    pub token: Option<String>,
}

impl AuthenticatedUser {
    /// Pick the user object and token out of an upstream login response.
    ///
    /// Upstreams disagree on key names, so `user`, `student` and `profile`
    /// are checked in that order, and `token` before `accessToken`.
    pub fn from_upstream(payload: &Value, username: &str) -> Self {
        let user = ["user", "student", "profile"]
            .iter()
            .filter_map(|key| payload.get(key))
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "username": username }));

        let token = ["token", "accessToken"]
            .iter()
            .filter_map(|key| payload.get(key).and_then(Value::as_str))
            .find(|t| !t.is_empty())
            .map(str::to_owned);

        Self { user, token }
    }

    /// Best human readable name for logs
    pub fn display_name(&self) -> String {
        for key in ["fullName", "username", "id"] {
            match self.user.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(Value::Number(n)) => return n.to_string(),
                _ => {}
            }
        }
        "unknown".to_string()
    }
}
