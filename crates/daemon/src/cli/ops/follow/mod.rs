use clap::{Args, Subcommand};

pub mod add;
pub mod ls;
pub mod rm;

use crate::cli::op::Op;
use dchannel_daemon::http_server::api::v0::follows::{
    AddFollowRequest, ListFollowsRequest, RemoveFollowRequest,
};

crate::command_enum! {
    (Add, AddFollowRequest),
    (Ls, ListFollowsRequest),
    (Rm, RemoveFollowRequest),
}

pub type FollowCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Follow {
    #[command(subcommand)]
    pub command: FollowCommand,
}

#[async_trait::async_trait]
impl Op for Follow {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
