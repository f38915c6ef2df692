use std::path::PathBuf;
use std::time::Duration;

use object_store::ObjectStoreConfig;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the app directory; the identity file lives here
    pub app_dir: PathBuf,

    // http server configuration
    pub api_port: u16,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,
    /// Bundle storage backend
    pub object_store: ObjectStoreConfig,

    // feed configuration
    pub poll_interval: Duration,
    pub armor: bool,
    /// Daemons asked to resolve names this node does not own
    pub name_peers: Vec<Url>,

    /// Unlock the identity at startup, creating it if needed.
    ///  `Some(None)` unlocks an identity file without a passphrase.
    pub unlock: Option<Option<String>>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Everything in memory. The identity file still goes to `app_dir`.
    pub fn ephemeral(app_dir: PathBuf) -> Self {
        Self {
            app_dir,
            api_port: 0,
            sqlite_path: None,
            object_store: ObjectStoreConfig::Memory,
            poll_interval: common::feed::DEFAULT_POLL_INTERVAL,
            armor: false,
            name_peers: Vec::new(),
            unlock: None,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
