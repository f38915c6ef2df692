use dchannel_daemon::http_server::api::client::ApiError;
use dchannel_daemon::http_server::api::v0::follows::ListFollowsRequest;

#[async_trait::async_trait]
impl crate::cli::op::Op for ListFollowsRequest {
    type Error = ApiError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let follows = client.call(self.clone()).await?;

        if follows.is_empty() {
            return Ok("Not following anything".to_string());
        }
        Ok(follows
            .iter()
            .map(|follow| {
                let head = follow
                    .latest_address
                    .map(|address| address.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let owner = if follow.is_self { " (self)" } else { "" };
                format!(
                    "{} {}{} {} [{}]",
                    follow.id, follow.display_name, owner, follow.external_name, head
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
