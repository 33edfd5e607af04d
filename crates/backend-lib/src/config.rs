// ============================
// classroom-backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are resolved once at startup from built-in defaults, an optional
//! TOML file and the environment, then shared read-only behind an `Arc`.
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use classroom_common::{ConfigInfo, ConfigSnapshot, FieldPair, HeaderMode};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;


/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "classroom.toml";
pub const DEFAULT_LOGIN_PATHS: &str = "/ss/classroomapi/auth/login";
pub const DEFAULT_LOGIN_FIELDS: &str =
    "username,password;email,password;studentId,password;studentId,pwd";
/// Upstream path every candidate path is dispatched to unless pinning is disabled
pub const DEFAULT_PINNED_LOGIN_PATH: &str = "/api/classroom/signin";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Prefix of every setting read from the environment
const ENV_PREFIX: &str = "CLASSROOM_";

/// Settings whose environment value is used exactly as written. figment's
/// `Env` parses values, so `007123` would otherwise arrive as `7123`.
const VERBATIM_ENV_KEYS: [&str; 5] = ["api_base", "login_paths", "login_fields", "api_key", "bearer_token"];

/// Errors raised while resolving settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CLASSROOM_API_BASE is not set")]
    MissingBaseUrl,

    #[error("invalid upstream base URL {0:?}: {1}")]
    InvalidBaseUrl(String, String),

    #[error("no usable login path in {0:?}")]
    NoCandidatePaths(String),

    #[error("no usable field pair in {0:?}")]
    NoFieldPairs(String),

    #[error("invalid bind address {0:?}")]
    InvalidBindAddr(String),

    #[error("invalid upstream timeout {0:?}")]
    InvalidTimeout(String),

    #[error("{0} contains characters not allowed in an HTTP header")]
    InvalidHeaderValue(&'static str),

    #[error("config file not found: {0}")]
    MissingConfigFile(PathBuf),

    #[error("failed to build upstream HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Figment(#[from] figment::Error),
}

/// Settings as they come out of figment, before validation.
///
/// Every field is read as text. Numbers and booleans coming from the TOML
/// file or the parsed environment are converted back with `to_string`.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default, deserialize_with = "scalar")]
    api_base: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    login_paths: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    login_fields: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    api_key: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    bearer_token: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    log_upstream_detail: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pinned_login_path: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    upstream_timeout_secs: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    bind_addr: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    log_level: Option<String>,
}

/// Accept strings, numbers, booleans and lists of those as text.
/// Lists (TOML arrays) are joined with `;`.
fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn text(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Array(items) => Some(items.iter().filter_map(text).collect::<Vec<_>>().join(";")),
            Value::Object(_) => None,
        }
    }

    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(Value::Object(_)) => Err(serde::de::Error::custom("expected a string or a list")),
        Some(v) => Ok(text(&v)),
        None => Ok(None),
    }
}

/// Application settings
#[derive(Clone)]
pub struct Settings {
    /// Upstream origin, without trailing slash
    pub base_url: String,
    /// Candidate login paths, in try order
    pub candidate_paths: Vec<String>,
    /// Candidate payload field names, in try order
    pub field_pairs: Vec<FieldPair>,
    /// Sent as `X-API-KEY`
    pub api_key: Option<String>,
    /// Sent as `Authorization: Bearer ...`
    pub bearer_token: Option<String>,
    /// Surface attempt diagnostics in failure responses and the operator log
    pub verbose_logging: bool,
    /// When set, every candidate path is dispatched to this path instead
    pub pinned_login_path: Option<String>,
    /// Upper bound for a single upstream attempt
    pub upstream_timeout: Duration,
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Default tracing filter
    pub log_level: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("base_url", &self.base_url)
            .field("candidate_paths", &self.candidate_paths)
            .field("field_pairs", &self.field_pairs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("verbose_logging", &self.verbose_logging)
            .field("pinned_login_path", &self.pinned_login_path)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Settings {
    /// Settings for `base_url` with every other value at its default.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Self::resolve(RawSettings {
            api_base: Some(base_url.to_string()),
            ..RawSettings::default()
        })
    }

    /// Load from `classroom.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(None)?)
    }

    /// Load from an explicit config file and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(Some(path.as_ref()))?)
    }

    /// Layered providers: config file, then `CLASSROOM_*` (with the verbatim
    /// keys re-read as plain strings), then `LOG_UPSTREAM_DETAIL`.
    pub fn figment(config_file: Option<&Path>) -> Result<Figment, ConfigError> {
        let file = match config_file {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingConfigFile(path.to_path_buf()))
            },
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        Ok(Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config_file"]))
            .merge(verbatim_env())
            .merge(Env::raw().only(&["LOG_UPSTREAM_DETAIL"])))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let raw: RawSettings = figment.extract()?;
        Self::resolve(raw)
    }

    fn resolve(raw: RawSettings) -> Result<Self, ConfigError> {
        let base_url = parse_base_url(raw.api_base.as_deref().unwrap_or_default())?;

        let paths_src = raw.login_paths.unwrap_or_else(|| DEFAULT_LOGIN_PATHS.to_string());
        let candidate_paths = parse_paths(&paths_src);
        if candidate_paths.is_empty() {
            return Err(ConfigError::NoCandidatePaths(paths_src));
        }

        let fields_src = raw.login_fields.unwrap_or_else(|| DEFAULT_LOGIN_FIELDS.to_string());
        let field_pairs = parse_field_pairs(&fields_src);
        if field_pairs.is_empty() {
            return Err(ConfigError::NoFieldPairs(fields_src));
        }

        let pinned_login_path = match raw.pinned_login_path {
            None => Some(DEFAULT_PINNED_LOGIN_PATH.to_string()),
            Some(p) if p.trim().is_empty() => None,
            Some(p) => Some(normalize_path(p.trim())),
        };

        let upstream_timeout = match raw.upstream_timeout_secs {
            None => Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            Some(s) => match s.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout(s)),
            },
        };

        let bind_src = raw.bind_addr.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_src
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_src.clone()))?;

        Ok(Self {
            base_url,
            candidate_paths,
            field_pairs,
            api_key: non_empty(raw.api_key),
            bearer_token: non_empty(raw.bearer_token),
            verbose_logging: raw.log_upstream_detail.as_deref() == Some("true"),
            pinned_login_path,
            upstream_timeout,
            bind_addr,
            log_level: non_empty(raw.log_level).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }

    /// `X-API-KEY` wins over `Bearer` when both are configured
    pub fn header_mode(&self) -> HeaderMode {
        if self.api_key.is_some() {
            HeaderMode::ApiKey
        } else if self.bearer_token.is_some() {
            HeaderMode::Bearer
        } else {
            HeaderMode::None
        }
    }

    /// `base + path`, ignoring pinning
    pub fn candidate_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL an attempt for `path` is actually sent to
    pub fn dispatch_url(&self, path: &str) -> String {
        match &self.pinned_login_path {
            Some(pinned) => self.candidate_url(pinned),
            None => self.candidate_url(path),
        }
    }

    /// Resolved configuration for `GET /login/config`. Never includes secrets.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            ok: true,
            info: ConfigInfo {
                base: self.base_url.clone(),
                paths: self.candidate_paths.clone(),
                field_pairs: self.field_pairs.clone(),
                header_mode: self.header_mode(),
                url_preview: self.candidate_paths.iter().map(|p| self.candidate_url(p)).collect(),
                dispatch_urls: self.candidate_paths.iter().map(|p| self.dispatch_url(p)).collect(),
                pinned_path: self.pinned_login_path.clone(),
                verbose: self.verbose_logging,
            },
        }
    }
}

/// Load settings, reporting which source failed
pub fn load_settings(config_file: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match config_file {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load().context("loading settings")?,
    };
    Ok(settings)
}

/// Unparsed `CLASSROOM_*` values for [`VERBATIM_ENV_KEYS`]
fn verbatim_env() -> Serialized<BTreeMap<&'static str, String>> {
    let values = VERBATIM_ENV_KEYS
        .into_iter()
        .filter_map(|key| {
            let var = format!("{ENV_PREFIX}{}", key.to_ascii_uppercase());
            std::env::var(var).ok().map(|value| (key, value))
        })
        .collect();
    Serialized::defaults(values)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::MissingBaseUrl);
    }
    let url = url::Url::parse(trimmed)
        .map_err(|e| ConfigError::InvalidBaseUrl(raw.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl(
            raw.to_string(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Split a `,` or `;` separated path list, dropping blanks and adding a
/// leading `/` where missing. Order is kept and duplicates are not removed.
pub fn parse_paths(src: &str) -> Vec<String> {
    src.split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(normalize_path)
        .collect()
}

/// Parse `user,pass;user,pass` into field pairs. Entries that are not
/// exactly two non-empty names are dropped.
pub fn parse_field_pairs(src: &str) -> Vec<FieldPair> {
    src.split(';')
        .filter_map(|entry| {
            let names: Vec<&str> = entry.split(',').map(str::trim).collect();
            match names.as_slice() {
                [user, pass] if !user.is_empty() && !pass.is_empty() => {
                    Some(FieldPair::new(*user, *pass))
                },
                _ => None,
            }
        })
        .collect()
}
