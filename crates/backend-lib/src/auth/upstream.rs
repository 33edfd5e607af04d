//! A single POST to the upstream login endpoint.
//!
//! Nothing in here fails: every network, timeout or decoding problem ends
//! up in the returned [`AttemptRecord`].

use classroom_common::{AttemptOutcome, AttemptRecord, Encoding, FieldPair};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use url::form_urlencoded;

use super::plan::Combination;
use crate::config::{ConfigError, Settings};

/// Longest body excerpt kept in an attempt record, in characters
pub const BODY_PREVIEW_CHARS: usize = 400;

/// Enough UTF-8 bytes for `BODY_PREVIEW_CHARS` characters
const PREVIEW_BYTES: usize = BODY_PREVIEW_CHARS * 4;

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Static credential headers attached to every upstream call.
#[derive(Debug, Clone, Default)]
pub struct CredentialHeaders {
    headers: HeaderMap,
    names: Vec<&'static str>,
}

impl CredentialHeaders {
    /// Validate the configured API key and bearer token as header values.
    /// Both are attached when both are set.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let mut creds = Self::default();

        if let Some(key) = &settings.api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| ConfigError::InvalidHeaderValue("CLASSROOM_API_KEY"))?;
            value.set_sensitive(true);
            creds.headers.insert(X_API_KEY, value);
            creds.names.push("X-API-KEY");
        }

        if let Some(token) = &settings.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ConfigError::InvalidHeaderValue("CLASSROOM_BEARER_TOKEN"))?;
            value.set_sensitive(true);
            creds.headers.insert(AUTHORIZATION, value);
            creds.names.push("Authorization");
        }

        Ok(creds)
    }

    /// Names of every header an attempt sends, in the order they are set
    fn request_header_names(&self) -> Vec<String> {
        std::iter::once("Content-Type")
            .chain(self.names.iter().copied())
            .map(str::to_owned)
            .collect()
    }
}

/// Attempt record plus the upstream JSON when the attempt succeeded
#[derive(Debug)]
pub struct UpstreamReply {
    pub record: AttemptRecord,
    /// Body of a 2xx JSON response, validated but byte for byte as received
    pub payload: Option<Box<RawValue>>,
}

/// Credential payload keyed by `pair`, encoded for `encoding`
pub fn encode_payload(pair: &FieldPair, username: &str, password: &str, encoding: Encoding) -> String {
    match encoding {
        Encoding::Json => {
            let mut map = Map::new();
            map.insert(pair.username_field().to_string(), Value::from(username));
            map.insert(pair.password_field().to_string(), Value::from(password));
            Value::Object(map).to_string()
        },
        Encoding::Form => form_urlencoded::Serializer::new(String::new())
            .append_pair(pair.username_field(), username)
            .append_pair(pair.password_field(), password)
            .finish(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_CHARS).collect()
}

fn outcome_of(err: &reqwest::Error) -> AttemptOutcome {
    if err.is_timeout() {
        AttemptOutcome::Timeout
    } else {
        AttemptOutcome::Transport
    }
}

/// POST one combination to `url` and record what came back.
pub async fn send_attempt(
    client: &Client,
    url: &str,
    combo: &Combination<'_>,
    username: &str,
    password: &str,
    credentials: &CredentialHeaders,
) -> UpstreamReply {
    let mut record = AttemptRecord {
        url: url.to_string(),
        http_status: None,
        content_type: String::new(),
        body_preview: String::new(),
        request_header_names: credentials.request_header_names(),
        encoding: combo.encoding,
        field_pair: combo.pair.clone(),
        outcome: AttemptOutcome::Response,
        error: None,
    };

    let response = client
        .post(url)
        .header(CONTENT_TYPE, combo.encoding.content_type())
        .headers(credentials.headers.clone())
        .body(encode_payload(combo.pair, username, password, combo.encoding))
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            record.outcome = outcome_of(&err);
            record.error = Some(err.to_string());
            return UpstreamReply { record, payload: None };
        },
    };

    let status = response.status();
    record.http_status = Some(status.as_u16());
    record.content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let expects_payload = status.is_success() && record.content_type.contains("application/json");
    let body = if expects_payload {
        response.bytes().await.map(Vec::from)
    } else {
        read_prefix(response, PREVIEW_BYTES).await
    };
    let body = match body {
        Ok(body) => body,
        Err(err) => {
            record.outcome = outcome_of(&err);
            record.error = Some(err.to_string());
            return UpstreamReply { record, payload: None };
        },
    };
    record.body_preview = preview(&String::from_utf8_lossy(&body));

    let payload = if expects_payload {
        match serde_json::from_slice::<Box<RawValue>>(&body) {
            Ok(raw) => Some(raw),
            Err(err) => {
                record.error = Some(format!("invalid JSON body: {err}"));
                None
            },
        }
    } else {
        None
    };

    UpstreamReply { record, payload }
}

/// Read at most about `limit` bytes of the body. The rest is never pulled
/// off the socket.
async fn read_prefix(mut response: Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut buf = Vec::new();
    while buf.len() < limit {
        match response.chunk().await? {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => break,
        }
    }
    Ok(buf)
}
