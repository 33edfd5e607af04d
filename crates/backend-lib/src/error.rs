// crates/backend-lib/src/error.rs

//! Login failure taxonomy + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use classroom_common::{AttemptRecord, FailureBody};
use thiserror::Error;

/// Shown when username or password is missing
pub const MSG_BAD_REQUEST: &str = "กรุณากรอกชื่อผู้ใช้และรหัสผ่าน";
/// Shown when the upstream login route answered 404
pub const MSG_NOT_FOUND: &str =
    "ไม่พบเส้นทางล็อกอินของ Classroom API (404) โปรดตรวจสอบ CLASSROOM_API_BASE และ CLASSROOM_LOGIN_PATHS";
/// Shown when the upstream answered 401/403
pub const MSG_UNAUTHORIZED: &str =
    "ไม่ได้รับสิทธิ์เข้าถึง (401/403) โปรดตรวจสอบ API KEY / Bearer Token";
/// Shown when nothing useful came back
pub const MSG_UPSTREAM_MISMATCH: &str =
    "เข้าสู่ระบบไม่สำเร็จ โปรดลองเปลี่ยน PATH/FIELD/PAYLOAD ในการตั้งค่า หรือแจ้งผู้ดูแลระบบ";
pub const MSG_PROXY_ERROR: &str = "Proxy error";
pub const MSG_CANCELLED: &str = "คำขอเข้าสู่ระบบถูกยกเลิก";

/// Why a login did not produce an upstream success payload.
///
/// `detail` carries the leading attempt records and is only populated when
/// upstream diagnostics are enabled.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("username and password are required")]
    BadRequest,

    #[error("upstream login route not found (404), check base URL and login paths")]
    NotFoundMisconfiguration { detail: Option<Vec<AttemptRecord>> },

    #[error("upstream refused access (401/403), check API key or bearer token")]
    Unauthorized { detail: Option<Vec<AttemptRecord>> },

    #[error("no upstream attempt succeeded, check login paths, field pairs and payload encoding")]
    UpstreamUnavailableOrMismatch { detail: Option<Vec<AttemptRecord>> },

    #[error("proxy error: {message}")]
    InternalProxyError { message: String, expose: bool },

    #[error("login cancelled")]
    Cancelled,
}

impl LoginError {
    /// Internal failure whose message is echoed only when `expose` is set
    pub fn internal(message: impl Into<String>, expose: bool) -> Self {
        LoginError::InternalProxyError {
            message: message.into(),
            expose,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            LoginError::BadRequest => StatusCode::BAD_REQUEST,
            LoginError::NotFoundMisconfiguration { .. } => StatusCode::NOT_FOUND,
            LoginError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            LoginError::UpstreamUnavailableOrMismatch { .. } => StatusCode::BAD_GATEWAY,
            LoginError::InternalProxyError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            LoginError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LoginError::BadRequest => "bad_request",
            LoginError::NotFoundMisconfiguration { .. } => "not_found_misconfiguration",
            LoginError::Unauthorized { .. } => "unauthorized",
            LoginError::UpstreamUnavailableOrMismatch { .. } => "upstream_unavailable_or_mismatch",
            LoginError::InternalProxyError { .. } => "internal_proxy_error",
            LoginError::Cancelled => "cancelled",
        }
    }

    /// Localized message for the end user
    pub fn user_message(&self) -> &'static str {
        match self {
            LoginError::BadRequest => MSG_BAD_REQUEST,
            LoginError::NotFoundMisconfiguration { .. } => MSG_NOT_FOUND,
            LoginError::Unauthorized { .. } => MSG_UNAUTHORIZED,
            LoginError::UpstreamUnavailableOrMismatch { .. } => MSG_UPSTREAM_MISMATCH,
            LoginError::InternalProxyError { .. } => MSG_PROXY_ERROR,
            LoginError::Cancelled => MSG_CANCELLED,
        }
    }

    /// Attempt records attached to a classified failure, if any
    pub fn attempts(&self) -> Option<&[AttemptRecord]> {
        match self {
            LoginError::NotFoundMisconfiguration { detail }
            | LoginError::Unauthorized { detail }
            | LoginError::UpstreamUnavailableOrMismatch { detail } => detail.as_deref(),
            _ => None,
        }
    }

    /// Body sent to the client
    pub fn to_body(&self) -> FailureBody {
        let detail = match self {
            LoginError::InternalProxyError { message, expose: true } => {
                Some(serde_json::Value::String(message.clone()))
            },
            _ => self
                .attempts()
                .and_then(|attempts| serde_json::to_value(attempts).ok()),
        };

        FailureBody {
            error: true,
            code: self.status_code().as_u16(),
            message: self.user_message().to_string(),
            detail,
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_common::{AttemptOutcome, Encoding, FieldPair};

    fn record(status: u16) -> AttemptRecord {
        AttemptRecord {
            url: "https://cis.test/api/classroom/signin".to_string(),
            http_status: Some(status),
            content_type: "application/json".to_string(),
            body_preview: "{}".to_string(),
            request_header_names: vec!["Content-Type".to_string()],
            encoding: Encoding::Json,
            field_pair: FieldPair::new("username", "password"),
            outcome: AttemptOutcome::Response,
            error: None,
        }
    }

    #[test]
    fn test_login_error_status_codes() {
        assert_eq!(LoginError::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            LoginError::NotFoundMisconfiguration { detail: None }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LoginError::Unauthorized { detail: None }.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            LoginError::UpstreamUnavailableOrMismatch { detail: None }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            LoginError::internal("boom", false).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(LoginError::Cancelled.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_body_without_detail() {
        let body = LoginError::Unauthorized { detail: None }.to_body();
        assert!(body.error);
        assert_eq!(body.code, 401);
        assert_eq!(body.message, MSG_UNAUTHORIZED);
        assert!(body.detail.is_none());
    }

    #[test]
    fn test_body_with_attempts() {
        let err = LoginError::NotFoundMisconfiguration {
            detail: Some(vec![record(404)]),
        };
        let body = err.to_body();
        let detail = body.detail.unwrap();
        assert_eq!(detail[0]["httpStatus"], 404);
        assert_eq!(detail[0]["encoding"], "json");
    }

    #[test]
    fn test_internal_detail_is_gated() {
        assert!(LoginError::internal("EOF while parsing", false).to_body().detail.is_none());
        assert_eq!(
            LoginError::internal("EOF while parsing", true).to_body().detail,
            Some(serde_json::Value::String("EOF while parsing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_error_serialization() {
        let response = LoginError::UpstreamUnavailableOrMismatch { detail: None }.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: FailureBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, 502);
        assert_eq!(body.message, MSG_UPSTREAM_MISMATCH);
    }
}
