//! Integration tests for state that outlives a restart

mod common;

use std::sync::Arc;

use ::common::crypto::{encode_recipient, SecretKey};
use ::common::feed::{chain, PublishRequest, PublisherConfig};
use ::common::identity::IdentityStore;
use ::common::naming::MemoryNameService;
use object_store::ObjectStore;

#[tokio::test]
async fn test_chain_survives_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ObjectStore::new_local(dir.path()).await.unwrap());
    let feed = common::setup_sharing(
        store.clone(),
        MemoryNameService::new(),
        PublisherConfig::default(),
    )
    .await;
    let friend = SecretKey::generate();

    let mut heads = Vec::new();
    for body in ["one", "two", "three"] {
        let record = feed
            .publisher
            .publish(PublishRequest::new(body).recipients([encode_recipient(&friend.public())]))
            .await
            .unwrap();
        heads.push(record.cid);
    }
    let head = *heads.last().unwrap();
    store.pin(&head).await.unwrap();
    let identities = feed.keyring.decryption_identities();
    drop(feed);
    drop(store);

    let reopened = ObjectStore::new_local(dir.path()).await.unwrap();
    assert!(reopened.is_pinned(&head).await.unwrap());
    assert_eq!(reopened.bundles().await.unwrap().len(), 3);

    let entries = chain::walk(&reopened, &head, 10).await.unwrap();
    let walked: Vec<_> = entries.iter().map(|(cid, _)| *cid).collect();
    heads.reverse();
    assert_eq!(walked, heads);
    assert_eq!(entries.last().unwrap().1.next, None);

    let post = chain::read_post(&reopened, &head, &identities).await.unwrap();
    assert_eq!(post.body, "three");
}

#[tokio::test]
async fn test_identity_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.age");

    let created = IdentityStore::new(&path).get_or_create(Some("pw")).unwrap();
    let rotated = IdentityStore::new(&path).rotate(Some("pw")).unwrap();
    assert_eq!(rotated.identities().len(), 2);

    let loaded = IdentityStore::new(&path).load(Some("pw")).unwrap();
    assert_eq!(loaded.recipient(), rotated.recipient());
    assert_ne!(loaded.recipient(), created.recipient());
    assert_eq!(loaded.identities()[0].public(), created.recipient());

    assert!(IdentityStore::new(&path).load(Some("wrong")).is_err());
}
