use crate::auth::{LoginBroker, LoginService};
use crate::error::LoginError;
use async_trait::async_trait;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

#[async_trait]
impl LoginService for LoginBroker {
    async fn attempt_login(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<Box<RawValue>, LoginError> {
        self.search(username, password, cancel).await
    }
}
