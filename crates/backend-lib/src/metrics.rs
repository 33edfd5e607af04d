// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const LOGIN_REQUEST: &str = "login.request";
pub const LOGIN_SUCCESS: &str = "login.success";
/// Labelled with `kind`
pub const LOGIN_FAILURE: &str = "login.failure";
/// Labelled with `encoding` and `outcome`
pub const UPSTREAM_ATTEMPT: &str = "login.upstream_attempt";
