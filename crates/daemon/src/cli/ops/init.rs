use std::path::PathBuf;

use clap::Args;
use url::Url;

use dchannel_daemon::state::{AppConfig, AppState, StateError, StoreConfig};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// API server port
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Seconds between follow polls (5 to 30)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Armor encrypted post files as text
    #[arg(long)]
    pub armor: bool,

    /// Keep bundles in memory only
    #[arg(long, conflicts_with = "objects_path")]
    pub memory_store: bool,

    /// Directory for bundle storage (defaults to <config dir>/objects)
    #[arg(long)]
    pub objects_path: Option<PathBuf>,

    /// Daemon asked to resolve names this node does not own, repeat for several
    #[arg(long = "name-peer")]
    pub name_peers: Vec<Url>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            armor: self.armor,
            name_peers: self.name_peers.clone(),
            ..Default::default()
        };
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        config.object_store = if self.memory_store {
            StoreConfig::Memory
        } else {
            StoreConfig::Local {
                path: self.objects_path.clone(),
            }
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        Ok(format!(
            "Initialized dchannel directory at {}\n  api_port:      {}\n  poll interval: {}s",
            state.app_dir.display(),
            state.config.api_port,
            state.config.poll_interval().as_secs()
        ))
    }
}
