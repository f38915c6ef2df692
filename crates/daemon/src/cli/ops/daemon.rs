use clap::Args;

use dchannel_daemon::state::AppState;
use dchannel_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Unlock the identity at startup, creating it on first run
    #[arg(long)]
    pub unlock: bool,

    /// Passphrase for the identity file
    #[arg(long, env = "DCHANNEL_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] dchannel_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        let config = ServiceConfig {
            object_store: state.config.object_store.resolve(&state.app_dir),
            app_dir: state.app_dir.clone(),
            api_port: self.api_port.unwrap_or(state.config.api_port),
            sqlite_path: Some(state.db_path),
            poll_interval: state.config.poll_interval(),
            armor: state.config.armor,
            name_peers: state.config.name_peers.clone(),
            unlock: self.unlock.then(|| self.passphrase.clone()),
            log_level: self.log_level,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
