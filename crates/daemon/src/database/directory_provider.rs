use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use common::crypto::encode_recipient;
use common::directory::{
    Channel, DirectoryError, DirectoryProvider, Follow, Message, NewPeer, Page, Peer,
};
use common::prelude::ContentAddress;

use super::types::{DAddress, DUuid};
use super::{Database, DatabaseError};

type Result<T> = std::result::Result<T, DirectoryError<DatabaseError>>;

fn provider(e: sqlx::Error) -> DirectoryError<DatabaseError> {
    DirectoryError::Provider(DatabaseError::Sqlx(e))
}

fn limits(page: Page) -> (i64, i64) {
    (i64::from(page.limit), i64::from(page.skip))
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    name: String,
    key_handle: String,
    external_name: String,
    latest: Option<DAddress>,
    created_at: OffsetDateTime,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            name: row.name,
            key_handle: row.key_handle,
            external_name: row.external_name,
            latest: row.latest.map(Into::into),
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FollowRow {
    id: DUuid,
    display_name: String,
    external_name: String,
    latest_address: Option<DAddress>,
    is_self: bool,
    created_at: OffsetDateTime,
}

impl From<FollowRow> for Follow {
    fn from(row: FollowRow) -> Self {
        Follow {
            id: row.id.into(),
            display_name: row.display_name,
            external_name: row.external_name,
            latest_address: row.latest_address.map(Into::into),
            is_self: row.is_self,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PeerRow {
    id: DUuid,
    display_name: String,
    recipient: String,
    peer_id: Option<String>,
    created_at: OffsetDateTime,
}

impl From<PeerRow> for Peer {
    fn from(row: PeerRow) -> Self {
        Peer {
            id: row.id.into(),
            display_name: row.display_name,
            recipient: row.recipient,
            peer_id: row.peer_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: DUuid,
    sender: Option<String>,
    body: String,
    received_at: OffsetDateTime,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id.into(),
            sender: row.sender,
            body: row.body,
            received_at: row.received_at,
        }
    }
}

const FOLLOW_COLUMNS: &str = "id, display_name, external_name, latest_address, is_self, created_at";

/// Insert a follow, or revive and relabel the existing row for the name.
async fn upsert_follow(
    conn: &mut sqlx::SqliteConnection,
    display_name: &str,
    external_name: &str,
    is_self: bool,
) -> std::result::Result<Follow, sqlx::Error> {
    let row: FollowRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO follows (id, display_name, external_name, latest_address, is_self, deleted, created_at)
        VALUES (?1, ?2, ?3, NULL, ?4, 0, ?5)
        ON CONFLICT(external_name) DO UPDATE SET
            display_name = excluded.display_name,
            is_self = excluded.is_self,
            deleted = 0
        RETURNING {FOLLOW_COLUMNS}
        "#
    ))
    .bind(DUuid(Uuid::new_v4()))
    .bind(display_name)
    .bind(external_name)
    .bind(is_self)
    .bind(OffsetDateTime::now_utc())
    .fetch_one(conn)
    .await?;
    Ok(row.into())
}

#[async_trait]
impl DirectoryProvider for Database {
    type Error = DatabaseError;

    async fn create_channel(
        &self,
        name: &str,
        key_handle: &str,
        external_name: &str,
    ) -> Result<Channel> {
        let mut tx = self.begin().await.map_err(provider)?;

        let row: ChannelRow = sqlx::query_as(
            r#"
            INSERT INTO channels (name, key_handle, external_name, latest, created_at)
            VALUES (?1, ?2, ?3, NULL, ?4)
            RETURNING name, key_handle, external_name, latest, created_at
            "#,
        )
        .bind(name)
        .bind(key_handle)
        .bind(external_name)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                DirectoryError::ChannelExists(name.to_string())
            }
            _ => provider(e),
        })?;

        upsert_follow(&mut *tx, name, external_name, true)
            .await
            .map_err(provider)?;
        tx.commit().await.map_err(provider)?;
        Ok(row.into())
    }

    async fn channel(&self, name: &str) -> Result<Option<Channel>> {
        let row: Option<ChannelRow> = sqlx::query_as(
            r#"
            SELECT name, key_handle, external_name, latest, created_at
            FROM channels
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&**self)
        .await
        .map_err(provider)?;
        Ok(row.map(Into::into))
    }

    async fn channels(&self) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            r#"
            SELECT name, key_handle, external_name, latest, created_at
            FROM channels
            ORDER BY created_at, name
            "#,
        )
        .fetch_all(&**self)
        .await
        .map_err(provider)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn remove_channel(&self, name: &str) -> Result<Channel> {
        let mut tx = self.begin().await.map_err(provider)?;

        let row: ChannelRow = sqlx::query_as(
            r#"
            DELETE FROM channels
            WHERE name = ?1
            RETURNING name, key_handle, external_name, latest, created_at
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(provider)?
        .ok_or_else(|| DirectoryError::ChannelNotFound(name.to_string()))?;

        sqlx::query("UPDATE follows SET deleted = 1 WHERE is_self = 1 AND external_name = ?1")
            .bind(&row.external_name)
            .execute(&mut *tx)
            .await
            .map_err(provider)?;

        tx.commit().await.map_err(provider)?;
        Ok(row.into())
    }

    async fn set_channel_head(&self, name: &str, address: &ContentAddress) -> Result<()> {
        let mut tx = self.begin().await.map_err(provider)?;

        let external_name: Option<String> = sqlx::query_scalar(
            "UPDATE channels SET latest = ?1 WHERE name = ?2 RETURNING external_name",
        )
        .bind(DAddress(*address))
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(provider)?;
        let external_name =
            external_name.ok_or_else(|| DirectoryError::ChannelNotFound(name.to_string()))?;

        sqlx::query(
            "UPDATE follows SET latest_address = ?1 WHERE is_self = 1 AND external_name = ?2",
        )
        .bind(DAddress(*address))
        .bind(&external_name)
        .execute(&mut *tx)
        .await
        .map_err(provider)?;

        tx.commit().await.map_err(provider)?;
        Ok(())
    }

    async fn add_follow(&self, display_name: &str, external_name: &str) -> Result<Follow> {
        let mut tx = self.begin().await.map_err(provider)?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows WHERE external_name = ?1 AND deleted = 0",
        )
        .bind(external_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(provider)?;
        if active > 0 {
            return Err(DirectoryError::FollowExists(external_name.to_string()));
        }

        let follow = upsert_follow(&mut *tx, display_name, external_name, false)
            .await
            .map_err(provider)?;
        tx.commit().await.map_err(provider)?;
        Ok(follow)
    }

    async fn follow(&self, id: Uuid) -> Result<Option<Follow>> {
        let row: Option<FollowRow> = sqlx::query_as(&format!(
            "SELECT {FOLLOW_COLUMNS} FROM follows WHERE id = ?1 AND deleted = 0"
        ))
        .bind(DUuid(id))
        .fetch_optional(&**self)
        .await
        .map_err(provider)?;
        Ok(row.map(Into::into))
    }

    async fn follows(&self, page: Page) -> Result<Vec<Follow>> {
        let (limit, offset) = limits(page);
        let rows: Vec<FollowRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FOLLOW_COLUMNS}
            FROM follows
            WHERE deleted = 0
            ORDER BY rowid
            LIMIT ?1 OFFSET ?2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&**self)
        .await
        .map_err(provider)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn remove_follow(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE follows SET deleted = 1 WHERE id = ?1 AND deleted = 0")
            .bind(DUuid(id))
            .execute(&**self)
            .await
            .map_err(provider)?;
        if result.rows_affected() == 0 {
            return Err(DirectoryError::FollowNotFound(id));
        }
        Ok(())
    }

    async fn set_follow_head(&self, id: Uuid, address: &ContentAddress) -> Result<Follow> {
        let row: Option<FollowRow> = sqlx::query_as(&format!(
            r#"
            UPDATE follows SET latest_address = ?1
            WHERE id = ?2 AND deleted = 0
            RETURNING {FOLLOW_COLUMNS}
            "#
        ))
        .bind(DAddress(*address))
        .bind(DUuid(id))
        .fetch_optional(&**self)
        .await
        .map_err(provider)?;
        row.map(Into::into).ok_or(DirectoryError::FollowNotFound(id))
    }

    async fn add_peer(&self, peer: NewPeer) -> Result<Peer> {
        let row: PeerRow = sqlx::query_as(
            r#"
            INSERT INTO peers (id, display_name, recipient, peer_id, deleted, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            RETURNING id, display_name, recipient, peer_id, created_at
            "#,
        )
        .bind(DUuid(Uuid::new_v4()))
        .bind(&peer.display_name)
        .bind(encode_recipient(&peer.recipient))
        .bind(&peer.peer_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&**self)
        .await
        .map_err(provider)?;
        Ok(row.into())
    }

    async fn peers(&self, page: Page) -> Result<Vec<Peer>> {
        let (limit, offset) = limits(page);
        let rows: Vec<PeerRow> = sqlx::query_as(
            r#"
            SELECT id, display_name, recipient, peer_id, created_at
            FROM peers
            WHERE deleted = 0
            ORDER BY rowid
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&**self)
        .await
        .map_err(provider)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn remove_peer(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE peers SET deleted = 1 WHERE id = ?1 AND deleted = 0")
            .bind(DUuid(id))
            .execute(&**self)
            .await
            .map_err(provider)?;
        if result.rows_affected() == 0 {
            return Err(DirectoryError::PeerNotFound(id));
        }
        Ok(())
    }

    async fn append_message(&self, sender: Option<&str>, body: &str) -> Result<Message> {
        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO messages (id, sender, body, received_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, sender, body, received_at
            "#,
        )
        .bind(DUuid(Uuid::new_v4()))
        .bind(sender)
        .bind(body)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&**self)
        .await
        .map_err(provider)?;
        Ok(row.into())
    }

    async fn messages(&self, page: Page) -> Result<Vec<Message>> {
        let (limit, offset) = limits(page);
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender, body, received_at
            FROM messages
            ORDER BY rowid DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&**self)
        .await
        .map_err(provider)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::crypto::SecretKey;

    async fn database() -> Database {
        Database::in_memory().await.unwrap()
    }

    fn address(seed: &str) -> ContentAddress {
        ContentAddress::of(seed.as_bytes())
    }

    #[tokio::test]
    async fn test_channel_head_updates_self_follow() {
        let db = database().await;
        let channel = db.create_channel("default", "handle", "dcn1aa").await.unwrap();
        assert_eq!(channel.latest, None);

        let follows = db.active_follows().await.unwrap();
        assert_eq!(follows.len(), 1);
        assert!(follows[0].is_self);

        db.set_channel_head("default", &address("one")).await.unwrap();
        let channel = db.channel("default").await.unwrap().unwrap();
        assert_eq!(channel.latest, Some(address("one")));
        let follow = db.follow(follows[0].id).await.unwrap().unwrap();
        assert_eq!(follow.latest_address, Some(address("one")));

        assert!(matches!(
            db.create_channel("default", "other", "dcn1bb").await,
            Err(DirectoryError::ChannelExists(_))
        ));
        assert!(matches!(
            db.set_channel_head("missing", &address("x")).await,
            Err(DirectoryError::ChannelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_channel_hides_self_follow() {
        let db = database().await;
        db.create_channel("news", "handle", "dcn1cc").await.unwrap();
        let removed = db.remove_channel("news").await.unwrap();
        assert_eq!(removed.external_name, "dcn1cc");
        assert!(db.active_follows().await.unwrap().is_empty());
        assert!(db.channel("news").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refollow_restores_row() {
        let db = database().await;
        let follow = db.add_follow("alice", "dcn1alice").await.unwrap();
        assert!(matches!(
            db.add_follow("alice again", "dcn1alice").await,
            Err(DirectoryError::FollowExists(_))
        ));

        db.set_follow_head(follow.id, &address("head")).await.unwrap();
        db.remove_follow(follow.id).await.unwrap();
        assert!(db.follow(follow.id).await.unwrap().is_none());
        assert!(matches!(
            db.remove_follow(follow.id).await,
            Err(DirectoryError::FollowNotFound(_))
        ));

        let restored = db.add_follow("Alice", "dcn1alice").await.unwrap();
        assert_eq!(restored.id, follow.id);
        assert_eq!(restored.display_name, "Alice");
        assert_eq!(restored.latest_address, Some(address("head")));
    }

    #[tokio::test]
    async fn test_follow_pages() {
        let db = database().await;
        for i in 0..5 {
            db.add_follow(&format!("f{i}"), &format!("dcn1{i}")).await.unwrap();
        }
        let page = db.follows(Page::new(1, 2)).await.unwrap();
        let names: Vec<_> = page.iter().map(|f| f.display_name.as_str()).collect();
        assert_eq!(names, vec!["f1", "f2"]);
        assert_eq!(db.follows(Page::new(4, 10)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_peers_and_messages() {
        let db = database().await;
        let key = SecretKey::generate().public();
        let peer = db
            .add_peer(NewPeer {
                display_name: "bob".into(),
                recipient: key,
                peer_id: None,
            })
            .await
            .unwrap();
        assert_eq!(peer.recipient, encode_recipient(&key));
        assert_eq!(db.peers(Page::default()).await.unwrap().len(), 1);
        db.remove_peer(peer.id).await.unwrap();
        assert!(db.peers(Page::default()).await.unwrap().is_empty());
        assert!(matches!(
            db.remove_peer(peer.id).await,
            Err(DirectoryError::PeerNotFound(_))
        ));

        db.append_message(Some("bob"), "first").await.unwrap();
        db.append_message(None, "second").await.unwrap();
        let messages = db.messages(Page::default()).await.unwrap();
        assert_eq!(messages[0].body, "second");
        assert_eq!(messages[1].sender.as_deref(), Some("bob"));
    }
}
