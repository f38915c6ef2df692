use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_store::ContentAddress;
use parking_lot::Mutex;
use uuid::Uuid;

use super::record::name_for;
use super::{NameKey, NameRecord, NameService, NamingError, ResolveHint};
use crate::crypto::SecretKey;

/// In-process name service.
///
/// With deferred propagation enabled, published records stay pending until
/// [`MemoryNameService::propagate`] is called, which models the lag of a
/// real naming network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNameService {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    keys: BTreeMap<String, (String, SecretKey)>,
    visible: HashMap<String, NameRecord>,
    pending: HashMap<String, NameRecord>,
    cache: HashMap<String, ContentAddress>,
    deferred: bool,
    offline: bool,
    unreachable: HashSet<String>,
    resolve_delay: Option<Duration>,
    resolves: usize,
}

impl MemoryNameService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records become visible only after [`MemoryNameService::propagate`].
    pub fn deferred() -> Self {
        let service = Self::default();
        service.inner.lock().deferred = true;
        service
    }

    /// Make every pending record visible.
    pub fn propagate(&self) {
        let mut inner = self.inner.lock();
        let pending: Vec<_> = inner.pending.drain().collect();
        for (name, record) in pending {
            inner.visible.insert(name, record);
        }
    }

    /// Fail every publish and fresh resolve.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Fail resolves of one name only.
    pub fn set_unreachable(&self, name: &str, unreachable: bool) {
        let mut inner = self.inner.lock();
        if unreachable {
            inner.unreachable.insert(name.to_string());
        } else {
            inner.unreachable.remove(name);
        }
    }

    pub fn set_resolve_delay(&self, delay: Option<Duration>) {
        self.inner.lock().resolve_delay = delay;
    }

    /// Accept a record published elsewhere, as a gossiped update would.
    pub fn insert_record(&self, record: NameRecord) -> Result<(), NamingError> {
        record.verify()?;
        self.inner.lock().visible.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn resolve_count(&self) -> usize {
        self.inner.lock().resolves
    }

    /// Latest record for a name, visible or not.
    pub fn latest_record(&self, name: &str) -> Option<NameRecord> {
        let inner = self.inner.lock();
        inner
            .pending
            .get(name)
            .or_else(|| inner.visible.get(name))
            .cloned()
    }
}

#[async_trait]
impl NameService for MemoryNameService {
    async fn generate(&self, label: &str) -> Result<NameKey, NamingError> {
        let key = SecretKey::generate();
        let name_key = NameKey {
            label: label.to_string(),
            name: name_for(&key.public()),
            key_handle: Uuid::new_v4().to_string(),
        };
        self.inner
            .lock()
            .keys
            .insert(name_key.key_handle.clone(), (label.to_string(), key));
        Ok(name_key)
    }

    async fn publish(
        &self,
        key_handle: &str,
        address: &ContentAddress,
    ) -> Result<NameRecord, NamingError> {
        let mut inner = self.inner.lock();
        let (_, key) = inner
            .keys
            .get(key_handle)
            .ok_or_else(|| NamingError::UnknownKey(key_handle.to_string()))?;
        let name = name_for(&key.public());
        if inner.offline {
            return Err(NamingError::Unreachable(name, "offline".into()));
        }

        let sequence = inner
            .pending
            .get(&name)
            .or_else(|| inner.visible.get(&name))
            .map(|r| r.sequence + 1)
            .unwrap_or(1);
        let record = NameRecord::sign(key, *address, sequence);

        if inner.deferred {
            inner.pending.insert(name, record.clone());
        } else {
            inner.visible.insert(name, record.clone());
        }
        Ok(record)
    }

    async fn resolve(&self, name: &str, hint: ResolveHint) -> Result<ContentAddress, NamingError> {
        let delay = {
            let mut inner = self.inner.lock();
            inner.resolves += 1;
            if hint == ResolveHint::Cached {
                if let Some(address) = inner.cache.get(name) {
                    return Ok(*address);
                }
            }
            inner.resolve_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock();
        if inner.offline || inner.unreachable.contains(name) {
            return Err(NamingError::Unreachable(name.to_string(), "offline".into()));
        }
        let record = inner
            .visible
            .get(name)
            .cloned()
            .ok_or_else(|| NamingError::NotPublished(name.to_string()))?;
        record.verify()?;
        inner.cache.insert(name.to_string(), record.value);
        Ok(record.value)
    }

    async fn remove(&self, key_handle: &str) -> Result<(), NamingError> {
        let mut inner = self.inner.lock();
        let (_, key) = inner
            .keys
            .remove(key_handle)
            .ok_or_else(|| NamingError::UnknownKey(key_handle.to_string()))?;
        let name = name_for(&key.public());
        inner.visible.remove(&name);
        inner.pending.remove(&name);
        inner.cache.remove(&name);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<NameKey>, NamingError> {
        Ok(self
            .inner
            .lock()
            .keys
            .iter()
            .map(|(handle, (label, key))| NameKey {
                label: label.clone(),
                name: name_for(&key.public()),
                key_handle: handle.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_resolve() {
        let names = MemoryNameService::new();
        let key = names.generate("main").await.unwrap();

        assert!(matches!(
            names.resolve(&key.name, ResolveHint::Fresh).await,
            Err(NamingError::NotPublished(_))
        ));

        let first = names
            .publish(&key.key_handle, &ContentAddress::of(b"1"))
            .await
            .unwrap();
        let second = names
            .publish(&key.key_handle, &ContentAddress::of(b"2"))
            .await
            .unwrap();
        assert!(second.sequence > first.sequence);
        assert_eq!(
            names.resolve(&key.name, ResolveHint::Fresh).await.unwrap(),
            ContentAddress::of(b"2")
        );
    }

    #[tokio::test]
    async fn test_deferred_propagation() {
        let names = MemoryNameService::deferred();
        let key = names.generate("main").await.unwrap();
        names
            .publish(&key.key_handle, &ContentAddress::of(b"1"))
            .await
            .unwrap();
        assert!(names.resolve(&key.name, ResolveHint::Fresh).await.is_err());

        names.propagate();
        assert_eq!(
            names.resolve(&key.name, ResolveHint::Fresh).await.unwrap(),
            ContentAddress::of(b"1")
        );
    }

    #[tokio::test]
    async fn test_cached_hint() {
        let names = MemoryNameService::new();
        let key = names.generate("main").await.unwrap();
        names
            .publish(&key.key_handle, &ContentAddress::of(b"1"))
            .await
            .unwrap();
        names.resolve(&key.name, ResolveHint::Fresh).await.unwrap();

        names.set_offline(true);
        assert!(names.resolve(&key.name, ResolveHint::Fresh).await.is_err());
        assert_eq!(
            names.resolve(&key.name, ResolveHint::Cached).await.unwrap(),
            ContentAddress::of(b"1")
        );
    }

    #[tokio::test]
    async fn test_remove_and_keys() {
        let names = MemoryNameService::new();
        let key = names.generate("main").await.unwrap();
        assert_eq!(names.keys().await.unwrap(), vec![key.clone()]);

        names.remove(&key.key_handle).await.unwrap();
        assert!(names.keys().await.unwrap().is_empty());
        assert!(matches!(
            names.publish(&key.key_handle, &ContentAddress::of(b"1")).await,
            Err(NamingError::UnknownKey(_))
        ));
    }
}
