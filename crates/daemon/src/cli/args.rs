pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "dchannel")]
#[command(about = "Publish and follow encrypted, append-only feeds")]
pub struct Args {
    /// Daemon API address (defaults to the configured api_port on localhost)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the dchannel config directory (defaults to ~/.dchannel)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
