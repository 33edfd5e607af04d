// ============================
// classroom-backend-lib/src/auth/mod.rs
// ============================
//! Upstream authentication.

pub mod broker;
pub mod plan;
pub mod upstream;
mod service;
mod service_impl;

pub use broker::LoginBroker;
pub use plan::{classify, verdict, Combination, SearchPlan, Verdict, MAX_DETAIL_ATTEMPTS};
pub use service::LoginService;
pub use upstream::{encode_payload, CredentialHeaders, UpstreamReply, BODY_PREVIEW_CHARS};
