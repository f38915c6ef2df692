use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::channels::ListChannelsRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for ListChannelsRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let channels = client.call(self.clone()).await?;
        Ok(channels
            .iter()
            .map(|channel| {
                let head = channel
                    .latest
                    .map(|address| address.to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!("{} {} [{}]", channel.name, channel.external_name, head)
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
