use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::channels::CreateChannelRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for CreateChannelRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let channel = client.call(self.clone()).await?;
        Ok(format!(
            "Created channel '{}'\n  name: {}",
            channel.name, channel.external_name
        ))
    }
}
