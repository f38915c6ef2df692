//! Naming keys and records kept in SQLite.
//!
//! Names this node owns resolve from the local record table. Any other name
//! is fetched from the configured peer daemons, verified, and cached; the
//! highest sequence seen wins.

use async_trait::async_trait;
use reqwest::StatusCode;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use common::crypto::SecretKey;
use common::naming::{name_for, owner_of, NameKey, NameRecord, NameService, NamingError, ResolveHint};
use common::prelude::ContentAddress;

use super::Database;
use crate::http_server::api::client::ApiClient;
use crate::http_server::api::v0::names::NameRecordRequest;

fn backend(e: impl std::fmt::Display) -> NamingError {
    NamingError::Backend(e.to_string())
}

#[derive(Debug, Clone)]
pub struct SqliteNameRegistry {
    db: Database,
    peers: Vec<Url>,
}

#[derive(sqlx::FromRow)]
struct KeyRow {
    key_handle: String,
    label: String,
    name: String,
    secret: String,
}

impl SqliteNameRegistry {
    pub fn new(db: Database, peers: Vec<Url>) -> Self {
        Self { db, peers }
    }

    /// Latest stored record for `name`, own or cached.
    pub async fn record(&self, name: &str) -> Result<Option<NameRecord>, NamingError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT record FROM name_records WHERE name = ?1")
                .bind(name)
                .fetch_optional(&*self.db)
                .await
                .map_err(backend)?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(backend))
            .transpose()
    }

    /// Store a verified record unless a newer one is already known.
    /// Returns whether the record was stored.
    async fn store(&self, record: &NameRecord) -> Result<bool, NamingError> {
        record.verify()?;
        let raw = serde_json::to_string(record).map_err(backend)?;
        let result = sqlx::query(
            r#"
            INSERT INTO name_records (name, sequence, record, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                sequence = excluded.sequence,
                record = excluded.record,
                updated_at = excluded.updated_at
            WHERE excluded.sequence > name_records.sequence
            "#,
        )
        .bind(&record.name)
        .bind(record.sequence as i64)
        .bind(raw)
        .bind(OffsetDateTime::now_utc())
        .execute(&*self.db)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn key(&self, key_handle: &str) -> Result<KeyRow, NamingError> {
        sqlx::query_as("SELECT key_handle, label, name, secret FROM name_keys WHERE key_handle = ?1")
            .bind(key_handle)
            .fetch_optional(&*self.db)
            .await
            .map_err(backend)?
            .ok_or_else(|| NamingError::UnknownKey(key_handle.to_string()))
    }

    async fn owns(&self, name: &str) -> Result<bool, NamingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM name_keys WHERE name = ?1")
            .bind(name)
            .fetch_one(&*self.db)
            .await
            .map_err(backend)?;
        Ok(count > 0)
    }

    /// Ask every peer for the record and keep the newest valid one.
    async fn fetch(&self, name: &str) -> Result<Option<NameRecord>, NamingError> {
        let mut newest: Option<NameRecord> = None;
        let mut failures = Vec::new();

        for peer in &self.peers {
            let mut client = ApiClient::new(peer).map_err(backend)?;
            let request = NameRecordRequest {
                name: name.to_string(),
            };
            match client.call(request).await {
                Ok(record) if record.name == name && record.verify().is_ok() => {
                    if newest.as_ref().map_or(true, |n| record.sequence > n.sequence) {
                        newest = Some(record);
                    }
                }
                Ok(_) => tracing::warn!(%name, %peer, "peer returned an invalid name record"),
                Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => {
                    tracing::debug!(%name, %peer, "peer has no record");
                }
                Err(e) => {
                    tracing::debug!(%name, %peer, "name fetch failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        if newest.is_none() && !self.peers.is_empty() && failures.len() == self.peers.len() {
            return Err(NamingError::Unreachable(
                name.to_string(),
                failures.join("; "),
            ));
        }
        Ok(newest)
    }
}

#[async_trait]
impl NameService for SqliteNameRegistry {
    async fn generate(&self, label: &str) -> Result<NameKey, NamingError> {
        let key = SecretKey::generate();
        let name_key = NameKey {
            label: label.to_string(),
            name: name_for(&key.public()),
            key_handle: Uuid::new_v4().to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO name_keys (key_handle, label, name, secret, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&name_key.key_handle)
        .bind(label)
        .bind(&name_key.name)
        .bind(key.to_hex())
        .bind(OffsetDateTime::now_utc())
        .execute(&*self.db)
        .await
        .map_err(backend)?;

        Ok(name_key)
    }

    async fn publish(
        &self,
        key_handle: &str,
        address: &ContentAddress,
    ) -> Result<NameRecord, NamingError> {
        let row = self.key(key_handle).await?;
        let key = SecretKey::from_hex(&row.secret).map_err(backend)?;
        let sequence = self
            .record(&row.name)
            .await?
            .map(|record| record.sequence + 1)
            .unwrap_or(1);

        let record = NameRecord::sign(&key, *address, sequence);
        if !self.store(&record).await? {
            let current = self
                .record(&row.name)
                .await?
                .map(|r| r.sequence)
                .unwrap_or_default();
            return Err(NamingError::StaleSequence {
                name: row.name,
                got: sequence,
                current,
            });
        }
        Ok(record)
    }

    async fn resolve(&self, name: &str, hint: ResolveHint) -> Result<ContentAddress, NamingError> {
        owner_of(name)?;
        let owned = self.owns(name).await?;
        if owned || hint == ResolveHint::Cached {
            if let Some(record) = self.record(name).await? {
                return Ok(record.value);
            }
            if owned {
                return Err(NamingError::NotPublished(name.to_string()));
            }
        }

        if let Some(record) = self.fetch(name).await? {
            self.store(&record).await?;
        }
        self.record(name)
            .await?
            .map(|record| record.value)
            .ok_or_else(|| NamingError::NotPublished(name.to_string()))
    }

    async fn remove(&self, key_handle: &str) -> Result<(), NamingError> {
        let name: Option<String> =
            sqlx::query_scalar("DELETE FROM name_keys WHERE key_handle = ?1 RETURNING name")
                .bind(key_handle)
                .fetch_optional(&*self.db)
                .await
                .map_err(backend)?;
        let name = name.ok_or_else(|| NamingError::UnknownKey(key_handle.to_string()))?;

        sqlx::query("DELETE FROM name_records WHERE name = ?1")
            .bind(&name)
            .execute(&*self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<NameKey>, NamingError> {
        let rows: Vec<KeyRow> =
            sqlx::query_as("SELECT key_handle, label, name, secret FROM name_keys ORDER BY rowid")
                .fetch_all(&*self.db)
                .await
                .map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|row| NameKey {
                label: row.label,
                name: row.name,
                key_handle: row.key_handle,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> SqliteNameRegistry {
        SqliteNameRegistry::new(Database::in_memory().await.unwrap(), Vec::new())
    }

    #[tokio::test]
    async fn test_publish_and_resolve_own_name() {
        let names = registry().await;
        let key = names.generate("default").await.unwrap();
        assert!(matches!(
            names.resolve(&key.name, ResolveHint::Fresh).await,
            Err(NamingError::NotPublished(_))
        ));

        let first = ContentAddress::of(b"first");
        let second = ContentAddress::of(b"second");
        let record = names.publish(&key.key_handle, &first).await.unwrap();
        assert_eq!(record.sequence, 1);
        let record = names.publish(&key.key_handle, &second).await.unwrap();
        assert_eq!(record.sequence, 2);

        assert_eq!(
            names.resolve(&key.name, ResolveHint::Fresh).await.unwrap(),
            second
        );
        assert_eq!(names.keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_older_records_never_replace_newer() {
        let names = registry().await;
        let key = SecretKey::generate();
        let newer = NameRecord::sign(&key, ContentAddress::of(b"new"), 5);
        let older = NameRecord::sign(&key, ContentAddress::of(b"old"), 4);

        assert!(names.store(&newer).await.unwrap());
        assert!(!names.store(&older).await.unwrap());
        let stored = names.record(&newer.name).await.unwrap().unwrap();
        assert_eq!(stored.sequence, 5);

        assert_eq!(
            names.resolve(&newer.name, ResolveHint::Cached).await.unwrap(),
            ContentAddress::of(b"new")
        );
    }

    #[tokio::test]
    async fn test_forged_records_are_rejected() {
        let names = registry().await;
        let mut record = NameRecord::sign(&SecretKey::generate(), ContentAddress::of(b"a"), 1);
        record.value = ContentAddress::of(b"b");
        assert!(matches!(
            names.store(&record).await,
            Err(NamingError::BadSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_forgets_key_and_record() {
        let names = registry().await;
        let key = names.generate("gone").await.unwrap();
        names
            .publish(&key.key_handle, &ContentAddress::of(b"x"))
            .await
            .unwrap();
        names.remove(&key.key_handle).await.unwrap();

        assert!(names.keys().await.unwrap().is_empty());
        assert!(names.record(&key.name).await.unwrap().is_none());
        assert!(matches!(
            names.remove(&key.key_handle).await,
            Err(NamingError::UnknownKey(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_peers() {
        let db = Database::in_memory().await.unwrap();
        let peer = Url::parse("http://127.0.0.1:9").unwrap();
        let names = SqliteNameRegistry::new(db, vec![peer]);
        let name = name_for(&SecretKey::generate().public());
        assert!(matches!(
            names.resolve(&name, ResolveHint::Fresh).await,
            Err(NamingError::Unreachable(_, _))
        ));
    }
}
