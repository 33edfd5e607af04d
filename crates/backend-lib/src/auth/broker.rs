// ============================
// classroom-backend-lib/src/auth/broker.rs
// ============================
//! Login broker: walks the search plan against the upstream login endpoint.
use std::sync::Arc;

use metrics::counter;
use reqwest::redirect::Policy;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::plan::{classify, verdict, SearchPlan, Verdict};
use super::upstream::{send_attempt, CredentialHeaders};
use crate::config::{ConfigError, Settings};
use crate::error::LoginError;
use crate::metrics::UPSTREAM_ATTEMPT;

/// Redirect hops followed per attempt
const MAX_REDIRECTS: usize = 10;

/// Tries every configured request shape until the upstream accepts one.
#[derive(Debug, Clone)]
pub struct LoginBroker {
    settings: Arc<Settings>,
    client: reqwest::Client,
    credentials: CredentialHeaders,
}

impl LoginBroker {
    /// Build the upstream client. Fails on credentials that cannot be sent
    /// as header values.
    pub fn new(settings: Arc<Settings>) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("classroom-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.upstream_timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()?;
        let credentials = CredentialHeaders::from_settings(&settings)?;

        Ok(Self {
            settings,
            client,
            credentials,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Search for a request shape the upstream accepts.
    ///
    /// Attempts run one after another. The body of the first 2xx JSON
    /// response is returned byte for byte. A 401/403 JSON response ends the current path. When
    /// `cancel` fires the search stops before issuing another attempt.
    pub async fn search(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<RawValue>, LoginError> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(LoginError::BadRequest);
        }

        let plan = SearchPlan::new(&self.settings.candidate_paths, &self.settings.field_pairs);
        let mut attempts = Vec::with_capacity(plan.len());
        let mut abandoned_path = None;

        for combo in plan.iter() {
            if abandoned_path == Some(combo.path_index) {
                continue;
            }

            let url = self.settings.dispatch_url(combo.path);
            let reply = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempts = attempts.len(), "login search cancelled");
                    return Err(LoginError::Cancelled);
                }
                reply = send_attempt(&self.client, &url, &combo, username, password, &self.credentials) => reply,
            };

            counter!(
                UPSTREAM_ATTEMPT,
                "encoding" => combo.encoding.as_str(),
                "outcome" => reply.record.outcome.as_str()
            )
            .increment(1);
            debug!(
                url = %reply.record.url,
                path = combo.path,
                fields = ?combo.pair,
                encoding = combo.encoding.as_str(),
                status = ?reply.record.http_status,
                outcome = reply.record.outcome.as_str(),
                "upstream attempt"
            );

            let step = verdict(&reply.record);
            attempts.push(reply.record);
            match (step, reply.payload) {
                (Verdict::Succeed, Some(payload)) => return Ok(payload),
                (Verdict::AbandonPath, _) => abandoned_path = Some(combo.path_index),
                _ => {},
            }
        }

        if self.settings.verbose_logging {
            let summary = serde_json::to_string(&attempts).unwrap_or_default();
            warn!(attempts = attempts.len(), summary = %summary, "no upstream login attempt succeeded");
        }

        Err(classify(&attempts, self.settings.verbose_logging))
    }
}
