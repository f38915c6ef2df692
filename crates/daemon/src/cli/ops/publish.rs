use clap::Args;

use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::feed::publish::PublishRequest;

#[derive(Args, Debug, Clone)]
pub struct Publish {
    #[command(flatten)]
    pub request: PublishRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishOpError {
    #[error("failed to read attachment: {0}")]
    Attachment(#[from] std::io::Error),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Publish {
    type Error = PublishOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut request = self.request.clone();
        request.load_files().await?;

        let mut client = ctx.client.clone();
        let record = client.call(request).await?;
        Ok(format!("Published {}\n  name: {}", record.cid, record.name))
    }
}
