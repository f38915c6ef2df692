//! Integration tests for publishing onto a channel

mod common;

use std::sync::Arc;

use ::common::crypto::{encode_recipient, envelope, EnvelopeError, Identity, SecretKey};
use ::common::directory::DirectoryProvider;
use ::common::feed::{chain, ChainError, PublishError, PublishRequest, PublisherConfig, POST_FILE};
use ::common::identity::{IdentityCell, Keyring};
use ::common::naming::MemoryNameService;

#[tokio::test]
async fn test_hello_world_chain() {
    let feed = common::setup().await;

    let first = feed
        .publisher
        .publish(PublishRequest::new("hello"))
        .await
        .unwrap();
    let meta = chain::read_meta(feed.store(), &first.cid).await.unwrap();
    assert_eq!(meta.next, None);
    assert!(meta.to.is_empty());
    assert_eq!(first.name, feed.channel.external_name);

    let second = feed
        .publisher
        .publish(PublishRequest::new("world"))
        .await
        .unwrap();
    let meta = chain::read_meta(feed.store(), &second.cid).await.unwrap();
    assert_eq!(meta.next, Some(first.cid));

    let post = chain::read_post(feed.store(), &second.cid, &[]).await.unwrap();
    assert_eq!(post.body, "world");
    assert_eq!(post.post_type, "plaintext");
}

#[tokio::test]
async fn test_chain_integrity() {
    let feed = common::setup().await;

    let mut published = Vec::new();
    for i in 0..6 {
        let record = feed
            .publisher
            .publish(PublishRequest::new(format!("post {i}")))
            .await
            .unwrap();
        published.push(record.cid);
    }

    let head = feed
        .directory
        .channel("default")
        .await
        .unwrap()
        .unwrap()
        .latest
        .unwrap();
    let walked = chain::walk(feed.store(), &head, 100).await.unwrap();
    let addresses: Vec<_> = walked.iter().map(|(cid, _)| *cid).collect();

    published.reverse();
    assert_eq!(addresses, published);
    assert!(walked.last().unwrap().1.is_genesis());

    let limited = chain::walk(feed.store(), &head, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_self_inclusion() {
    let feed = common::setup().await;
    let r1 = SecretKey::generate();
    let r2 = SecretKey::generate();
    let stranger = SecretKey::generate();

    let record = feed
        .publisher
        .publish(
            PublishRequest::new("for friends")
                .recipients([encode_recipient(&r1.public()), encode_recipient(&r2.public())])
                .attachment("photo.jpg", b"jpeg bytes".to_vec()),
        )
        .await
        .unwrap();

    let meta = chain::read_meta(feed.store(), &record.cid).await.unwrap();
    assert_eq!(meta.to.len(), 3);
    assert!(meta
        .to
        .contains(&encode_recipient(&feed.keyring.recipient())));

    let readers = [
        feed.keyring.decryption_identities(),
        vec![Identity::Key(r1)],
        vec![Identity::Key(r2)],
    ];
    for identities in &readers {
        let post = chain::read_post(feed.store(), &record.cid, identities)
            .await
            .unwrap();
        assert_eq!(post.body, "for friends");
        assert_eq!(post.attachments, vec!["photo.jpg".to_string()]);

        let photo = chain::read_file(feed.store(), &record.cid, "photo.jpg", identities)
            .await
            .unwrap();
        assert_eq!(photo.as_ref(), b"jpeg bytes");
    }

    let denied = chain::read_post(feed.store(), &record.cid, &[Identity::Key(stranger)]).await;
    assert!(matches!(
        denied,
        Err(ChainError::Decryption(EnvelopeError::NoMatchingIdentity))
    ));
}

#[tokio::test]
async fn test_public_post_is_plaintext() {
    let feed = common::setup().await;
    let record = feed
        .publisher
        .publish(PublishRequest::new("open letter").attachment("notes.txt", "plain"))
        .await
        .unwrap();

    let raw = feed.store.get_file(&record.cid, POST_FILE).await.unwrap();
    let post: ::common::feed::Post = serde_json::from_slice(&raw).unwrap();
    assert_eq!(post.body, "open letter");

    let notes = feed.store.get_file(&record.cid, "notes.txt").await.unwrap();
    assert_eq!(notes.as_ref(), b"plain");
}

#[tokio::test]
async fn test_armored_posts() {
    let config = PublisherConfig {
        armor: true,
        ..Default::default()
    };
    let feed = common::setup_with(MemoryNameService::new(), config).await;
    let friend = SecretKey::generate();

    let record = feed
        .publisher
        .publish(PublishRequest::new("armored").recipients([encode_recipient(&friend.public())]))
        .await
        .unwrap();

    let raw = feed.store.get_file(&record.cid, POST_FILE).await.unwrap();
    assert!(raw.starts_with(b"-----BEGIN DCHANNEL ENCRYPTED MESSAGE-----"));
    let opened = envelope::decrypt(&[Identity::Key(friend)], &raw).unwrap();
    assert!(String::from_utf8(opened).unwrap().contains("armored"));
}

#[tokio::test]
async fn test_fork_prevention() {
    let feed = common::setup().await;
    let publisher = Arc::new(feed.publisher.clone());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                publisher
                    .publish(PublishRequest::new(format!("concurrent {i}")))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut cids = Vec::new();
    for task in tasks {
        cids.push(task.await.unwrap().cid);
    }

    let mut nexts = Vec::new();
    for cid in &cids {
        let meta = chain::read_meta(feed.store(), cid).await.unwrap();
        nexts.push(meta.next);
    }
    let mut unique = nexts.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), nexts.len(), "two posts share a predecessor");

    let head = feed.directory.channel("default").await.unwrap().unwrap().latest.unwrap();
    let walked = chain::walk(feed.store(), &head, 100).await.unwrap();
    assert_eq!(walked.len(), cids.len());
}

#[tokio::test]
async fn test_chain_ignores_stale_name() {
    let feed = common::setup_with(MemoryNameService::deferred(), PublisherConfig::default()).await;

    let first = feed
        .publisher
        .publish(PublishRequest::new("one"))
        .await
        .unwrap();
    // the name has not propagated yet; the next post must still chain
    let second = feed
        .publisher
        .publish(PublishRequest::new("two"))
        .await
        .unwrap();

    let meta = chain::read_meta(feed.store(), &second.cid).await.unwrap();
    assert_eq!(meta.next, Some(first.cid));
}

#[tokio::test]
async fn test_name_published_in_background() {
    let feed = common::setup().await;
    let record = feed
        .publisher
        .publish(PublishRequest::new("hello"))
        .await
        .unwrap();
    common::wait_for_name(&feed.names, &record.name, record.cid).await;
}

#[tokio::test]
async fn test_name_failure_does_not_fail_publish() {
    let feed = common::setup().await;
    feed.names.set_offline(true);

    let record = feed
        .publisher
        .publish(PublishRequest::new("still works"))
        .await
        .unwrap();
    let channel = feed.directory.channel("default").await.unwrap().unwrap();
    assert_eq!(channel.latest, Some(record.cid));

    let next = feed
        .publisher
        .publish(PublishRequest::new("and again"))
        .await
        .unwrap();
    let meta = chain::read_meta(feed.store(), &next.cid).await.unwrap();
    assert_eq!(meta.next, Some(record.cid));
}

#[tokio::test]
async fn test_genesis_restarts_chain() {
    let feed = common::setup().await;
    feed.publisher
        .publish(PublishRequest::new("old chain"))
        .await
        .unwrap();
    let fresh = feed
        .publisher
        .publish(PublishRequest::new("new chain").genesis())
        .await
        .unwrap();
    let meta = chain::read_meta(feed.store(), &fresh.cid).await.unwrap();
    assert!(meta.is_genesis());
}

#[tokio::test]
async fn test_publish_failures_name_their_stage() {
    let feed = common::setup().await;

    let err = feed
        .publisher
        .publish(PublishRequest::new("x").recipients(["not-a-key"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::RecipientParse(_)));
    assert_eq!(err.stage(), "recipients");

    let err = feed
        .publisher
        .publish(PublishRequest::new("x").attachment("post.json", "spoof"))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::FilenameConflict(_)));

    let err = feed
        .publisher
        .publish(PublishRequest::new("x").channel("nowhere"))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "channel");

    feed.identity.lock();
    let err = feed
        .publisher
        .publish(PublishRequest::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::KeyNotReady(_)));
    assert_eq!(err.stage(), "identity");

    // nothing above touched the chain
    let channel = feed.directory.channel("default").await.unwrap().unwrap();
    assert_eq!(channel.latest, None);
}

#[tokio::test]
async fn test_rotation_keeps_history_readable() {
    let feed = common::setup().await;
    let friend = SecretKey::generate();
    let to_friend = [encode_recipient(&friend.public())];

    let before = feed
        .publisher
        .publish(PublishRequest::new("before rotation").recipients(to_friend.clone()))
        .await
        .unwrap();

    let mut keyring: Keyring = feed.identity.current().unwrap();
    let old_recipient = keyring.recipient();
    let new_recipient = keyring.rotate();
    feed.identity.unlock(keyring.clone());

    let after = feed
        .publisher
        .publish(PublishRequest::new("after rotation").recipients(to_friend))
        .await
        .unwrap();

    let meta = chain::read_meta(feed.store(), &after.cid).await.unwrap();
    assert!(meta.to.contains(&encode_recipient(&new_recipient)));
    assert!(!meta.to.contains(&encode_recipient(&old_recipient)));

    let identities = keyring.decryption_identities();
    for (cid, body) in [(before.cid, "before rotation"), (after.cid, "after rotation")] {
        let post = chain::read_post(feed.store(), &cid, &identities).await.unwrap();
        assert_eq!(post.body, body);
    }

    // the retired key alone cannot read the new post
    let old_only = IdentityCell::unlocked(feed.keyring.clone())
        .current()
        .unwrap()
        .decryption_identities();
    assert!(chain::read_post(feed.store(), &after.cid, &old_only)
        .await
        .is_err());
}
