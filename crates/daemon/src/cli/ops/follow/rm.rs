use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::follows::RemoveFollowRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for RemoveFollowRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        client.call(self.clone()).await?;
        Ok(format!("Unfollowed {}", self.id))
    }
}
