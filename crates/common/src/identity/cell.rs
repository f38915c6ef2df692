use std::sync::Arc;

use parking_lot::RwLock;

use super::Keyring;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no identity is unlocked")]
pub struct KeyNotReady;

/// The unlocked keyring, owned by the hosting service and handed to the
/// publisher and read paths.
#[derive(Debug, Clone, Default)]
pub struct IdentityCell(Arc<RwLock<Option<Keyring>>>);

impl IdentityCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unlocked(keyring: Keyring) -> Self {
        let cell = Self::new();
        cell.unlock(keyring);
        cell
    }

    pub fn unlock(&self, keyring: Keyring) {
        *self.0.write() = Some(keyring);
    }

    pub fn lock(&self) {
        *self.0.write() = None;
    }

    pub fn is_unlocked(&self) -> bool {
        self.0.read().is_some()
    }

    pub fn current(&self) -> Result<Keyring, KeyNotReady> {
        self.0.read().clone().ok_or(KeyNotReady)
    }
}
