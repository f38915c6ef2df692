use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use object_store::ObjectStoreConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use common::feed::{DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL};

pub const APP_NAME: &str = "dchannel";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const IDENTITY_FILE_NAME: &str = "identity.age";
pub const OBJECTS_DIR_NAME: &str = "objects";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Seconds between follow polls, clamped to 5..=30
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Armor encrypted post files as text
    #[serde(default)]
    pub armor: bool,
    /// Other daemons asked to resolve names this node does not own
    #[serde(default)]
    pub name_peers: Vec<Url>,
    #[serde(default)]
    pub object_store: StoreConfig,
}

fn default_api_port() -> u16 {
    5001
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            poll_interval_secs: default_poll_interval_secs(),
            armor: false,
            name_peers: Vec::new(),
            object_store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
    }
}

/// Where bundle bytes are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Lost on restart
    Memory,
    /// Local filesystem (defaults to <app dir>/objects)
    Local { path: Option<PathBuf> },
    /// S3-compatible object storage, shareable between nodes
    S3 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        region: Option<String>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local { path: None }
    }
}

impl StoreConfig {
    /// Resolve to a concrete backend configuration.
    pub fn resolve(&self, app_dir: &std::path::Path) -> ObjectStoreConfig {
        match self {
            StoreConfig::Memory => ObjectStoreConfig::Memory,
            StoreConfig::Local { path } => ObjectStoreConfig::Local {
                path: path
                    .clone()
                    .unwrap_or_else(|| app_dir.join(OBJECTS_DIR_NAME)),
            },
            StoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => ObjectStoreConfig::S3 {
                endpoint: endpoint.clone(),
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
                bucket: bucket.clone(),
                region: region.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the app directory (~/.dchannel)
    pub app_dir: PathBuf,
    pub db_path: PathBuf,
    /// Passphrase-sealed keyring, written on first unlock
    pub identity_path: PathBuf,
    pub objects_path: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// The app directory path (custom or default ~/.dchannel)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    fn at(app_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            db_path: app_dir.join(DB_FILE_NAME),
            identity_path: app_dir.join(IDENTITY_FILE_NAME),
            objects_path: app_dir.join(OBJECTS_DIR_NAME),
            config_path: app_dir.join(CONFIG_FILE_NAME),
            app_dir,
            config,
        }
    }

    /// Create a new app directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;
        if app_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&app_dir)?;

        let state = Self::at(app_dir, config.unwrap_or_default());
        fs::create_dir_all(&state.objects_path)?;
        fs::write(&state.config_path, toml::to_string_pretty(&state.config)?)?;
        // the service migrates it on first start
        fs::write(&state.db_path, "")?;

        Ok(state)
    }

    /// Load an existing app directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;
        if !app_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = app_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        let state = Self::at(app_dir, config);
        if !state.db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !state.objects_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", OBJECTS_DIR_NAME)));
        }

        Ok(state)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("dchannel directory not initialized. Run 'dchannel init' first")]
    NotInitialized,

    #[error("dchannel directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app");

        let created = AppState::init(Some(path.clone()), None).unwrap();
        assert!(created.objects_path.exists());
        assert!(!created.identity_path.exists());
        assert!(matches!(
            AppState::init(Some(path.clone()), None),
            Err(StateError::AlreadyInitialized)
        ));

        let loaded = AppState::load(Some(path)).unwrap();
        assert_eq!(loaded.config.api_port, 5001);
        assert_eq!(loaded.config.object_store, StoreConfig::Local { path: None });
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let config: AppConfig = toml::from_str("poll_interval_secs = 1").unwrap();
        assert_eq!(config.poll_interval(), MIN_POLL_INTERVAL);
        let config: AppConfig = toml::from_str("poll_interval_secs = 600").unwrap();
        assert_eq!(config.poll_interval(), MAX_POLL_INTERVAL);
        let config: AppConfig = toml::from_str(
            r#"
            armor = true

            [object_store]
            type = "memory"
            "#,
        )
        .unwrap();
        assert!(config.armor);
        assert_eq!(config.object_store, StoreConfig::Memory);
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
    }
}
