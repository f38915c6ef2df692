use clap::Args;

use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::names::ResolveRequest;

#[derive(Args, Debug, Clone)]
pub struct Resolve {
    #[command(flatten)]
    pub request: ResolveRequest,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Resolve {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let resolved = client.call(self.request.clone()).await?;
        Ok(resolved.value.to_string())
    }
}
