use clap::Args;

use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::identity::UnlockRequest;

#[derive(Args, Debug, Clone)]
pub struct Unlock {
    #[command(flatten)]
    pub request: UnlockRequest,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Unlock {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client.call(self.request.clone()).await?;
        Ok(match response.recipient {
            Some(recipient) => format!("Unlocked. Recipient: {}", recipient),
            None => "Unlocked".to_string(),
        })
    }
}
