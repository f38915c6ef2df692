use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::follows::AddFollowRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for AddFollowRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let follow = client.call(self.clone()).await?;
        Ok(format!(
            "Following {} as '{}' (id {})",
            follow.external_name, follow.display_name, follow.id
        ))
    }
}
