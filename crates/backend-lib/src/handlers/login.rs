// ============================
// crates/backend-lib/src/handlers/login.rs
// ============================
//! HTTP handlers for the login proxy.
use axum::{body::Bytes, extract::State, Json};
use classroom_common::{AuthenticatedUser, ConfigSnapshot, LoginRequest};
use metrics::counter;
use serde_json::value::RawValue;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::LoginError;
use crate::metrics::{LOGIN_FAILURE, LOGIN_REQUEST, LOGIN_SUCCESS};
use crate::AppState;

/// `POST /login`
///
/// The body is parsed by hand so that an unreadable body is reported in the
/// proxy's own failure shape. A successful upstream body is forwarded
/// without re-encoding. The search is cancelled if this future is
/// dropped (client went away) or the server shuts down.
pub async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Box<RawValue>>, LoginError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("login", %request_id);

    async move {
        counter!(LOGIN_REQUEST).increment(1);

        let request: LoginRequest = serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "unreadable login body");
            counter!(LOGIN_FAILURE, "kind" => "internal_proxy_error").increment(1);
            LoginError::internal(e.to_string(), state.settings.verbose_logging)
        })?;
        let username = request.username.unwrap_or_default();
        let password = request.password.unwrap_or_default();

        let cancel = state.shutdown.child_token();
        let _guard = cancel.clone().drop_guard();

        match state.login.attempt_login(&username, &password, &cancel).await {
            Ok(payload) => {
                let parsed: Value = serde_json::from_str(payload.get()).unwrap_or_default();
                let who = AuthenticatedUser::from_upstream(&parsed, username.trim());
                info!(has_token = who.token.is_some(), "login succeeded");
                debug!(user = %who.display_name(), "authenticated user");
                counter!(LOGIN_SUCCESS).increment(1);
                Ok(Json(payload))
            },
            Err(err) => {
                info!(kind = err.kind(), status = err.status_code().as_u16(), "login failed: {err}");
                counter!(LOGIN_FAILURE, "kind" => err.kind()).increment(1);
                Err(err)
            },
        }
    }
    .instrument(span)
    .await
}

/// `GET /login/config`
pub async fn login_config(State(state): State<AppState>) -> Json<ConfigSnapshot> {
    Json(state.settings.snapshot())
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
