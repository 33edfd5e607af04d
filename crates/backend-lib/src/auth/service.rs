use async_trait::async_trait;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use crate::error::LoginError;

#[async_trait]
pub trait LoginService: Send + Sync {
    /// Authenticate against the upstream, returning its JSON body exactly as received.
    async fn attempt_login(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<RawValue>, LoginError>;
}
