use clap::{Args, Subcommand};

pub mod create;
pub mod ls;

use crate::cli::op::Op;
use dchannel_daemon::http_server::api::v0::channels::{CreateChannelRequest, ListChannelsRequest};

crate::command_enum! {
    (Create, CreateChannelRequest),
    (Ls, ListChannelsRequest),
}

pub type ChannelCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Channel {
    #[command(subcommand)]
    pub command: ChannelCommand,
}

#[async_trait::async_trait]
impl Op for Channel {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
