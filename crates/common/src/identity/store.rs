use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::info;

use super::{IdentityError, Keyring};

/// Identity file on disk.
///
/// Writes go to a uniquely named sibling temp file and are renamed into
/// place, so a crash mid-write never leaves a truncated keyring behind.
/// Clones share one write lock; read-modify-write sequences on the file
/// (`get_or_create`, `rotate`) run under it.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
    armor: bool,
    write_lock: Arc<Mutex<()>>,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armor: true,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_armor(mut self, armor: bool) -> Self {
        self.armor = armor;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self, passphrase: Option<&str>) -> Result<Keyring, IdentityError> {
        let data = std::fs::read(&self.path)?;
        Keyring::open(&data, passphrase)
    }

    /// Load the keyring, creating and persisting a new one on first use.
    pub fn get_or_create(&self, passphrase: Option<&str>) -> Result<Keyring, IdentityError> {
        let _guard = self.write_lock.lock();
        if self.exists() {
            return self.load(passphrase);
        }
        let keyring = Keyring::generate();
        self.write(&keyring, passphrase)?;
        info!(path = %self.path.display(), "created new identity");
        Ok(keyring)
    }

    /// Append a new key, make it current and re-encrypt the file.
    pub fn rotate(&self, passphrase: Option<&str>) -> Result<Keyring, IdentityError> {
        let _guard = self.write_lock.lock();
        let mut keyring = self.load(passphrase)?;
        let recipient = keyring.rotate();
        self.write(&keyring, passphrase)?;
        info!(
            identities = keyring.identities().len(),
            recipient = %crate::crypto::encode_recipient(&recipient),
            "rotated identity"
        );
        Ok(keyring)
    }

    pub fn save(&self, keyring: &Keyring, passphrase: Option<&str>) -> Result<(), IdentityError> {
        let _guard = self.write_lock.lock();
        self.write(keyring, passphrase)
    }

    fn write(&self, keyring: &Keyring, passphrase: Option<&str>) -> Result<(), IdentityError> {
        let sealed = keyring.seal(passphrase, self.armor)?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&sealed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
