mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use ::common::crypto::{encode_recipient, SecretKey};
use ::common::identity::IdentityStore;
use ::common::naming::name_for;

use common::{daemon, locked_daemon};

#[tokio::test]
async fn test_publishes_chain_onto_cached_head() {
    let node = daemon().await;

    let first = node.publish_text("hello").await;
    let second = node.publish_text("world").await;
    assert_ne!(first, second);

    let (status, value) = node.get(&format!("/api/v0/feed/{}", first)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["meta"]["next"], "");

    let (status, value) = node.get(&format!("/api/v0/feed/{}", second)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["meta"]["next"], first.as_str());
    assert_eq!(value["data"]["files"], json!(["meta.json", "post.json"]));

    let (status, value) = node.get("/api/v0/feed/history").await;
    assert_eq!(status, StatusCode::OK);
    let entries = value["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["cid"], second.as_str());
    assert_eq!(entries[0]["post"]["body"], "world");
    assert_eq!(entries[1]["cid"], first.as_str());
    assert_eq!(value["data"]["head"], second.as_str());
}

#[tokio::test]
async fn test_genesis_starts_a_new_chain() {
    let node = daemon().await;
    node.publish_text("one").await;

    let (status, value) = node
        .publish(&[("body", "fresh start"), ("genesis", "true")], &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    let cid = value["data"]["cid"].as_str().unwrap();

    let (_, value) = node.get(&format!("/api/v0/feed/{}", cid)).await;
    assert_eq!(value["data"]["meta"]["next"], "");
}

#[tokio::test]
async fn test_encrypted_post_reads_back_for_author_only() {
    let node = daemon().await;
    let friend = encode_recipient(&SecretKey::generate().public());

    let (status, value) = node
        .publish(
            &[("body", "for friends"), ("type", "note"), ("to", &friend)],
            &[("photo.txt", b"attached bytes")],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", value);
    let cid = value["data"]["cid"].as_str().unwrap().to_string();

    // meta stays readable and lists the author next to the friend
    let (_, value) = node.get(&format!("/api/v0/feed/{}", cid)).await;
    let to = value["data"]["meta"]["to"].as_array().unwrap();
    assert_eq!(to.len(), 2);
    assert!(to.iter().any(|r| r == friend.as_str()));

    let (status, body) = node
        .request(
            Request::get(format!("/api/v0/feed/{}/post.json", cid))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let post: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(post["body"], "for friends");
    assert_eq!(post["type"], "note");
    assert_eq!(post["attachments"], json!(["photo.txt"]));

    let (status, body) = node
        .request(
            Request::get(format!("/api/v0/feed/{}/photo.txt", cid))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"attached bytes");

    node.state.identity().lock();
    let (status, value) = node.get(&format!("/api/v0/feed/{}/post.json", cid)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(value["error"]["stage"], "decrypt");
}

#[tokio::test]
async fn test_public_files_are_served_with_their_type() {
    let node = daemon().await;
    let (_, value) = node
        .publish(&[("body", "see attached")], &[("notes.txt", b"plain text")])
        .await;
    let cid = value["data"]["cid"].as_str().unwrap();

    let response = tower::ServiceExt::oneshot(
        node.router.clone(),
        Request::get(format!("/api/v0/feed/{}/notes.txt", cid))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
}

#[tokio::test]
async fn test_publish_failures_name_their_stage() {
    let node = locked_daemon().await;
    let (status, value) = node.publish(&[("body", "nobody home")], &[]).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["stage"], "identity");

    let node = daemon().await;
    let (status, value) = node
        .publish(&[("body", "x"), ("to", "not-a-key")], &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["stage"], "recipients");

    let (status, value) = node
        .publish(&[("body", "x")], &[("meta.json", b"{}")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["stage"], "attachments");

    let (status, value) = node.publish(&[("channel", "default")], &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["stage"], "request");

    // nothing was published by the failed attempts
    let (_, value) = node.get("/api/v0/feed/history").await;
    assert_eq!(value["data"]["entries"], json!([]));
}

#[tokio::test]
async fn test_unknown_bundle_is_not_found() {
    let node = daemon().await;
    let cid = node.publish_text("exists").await;

    let (status, value) = node.get(&format!("/api/v0/feed/{}/missing.txt", cid)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["ok"], false);

    let (status, _) = node.get("/api/v0/feed/not-a-cid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_channels() {
    let node = daemon().await;

    let (status, value) = node.post("/api/v0/channels", json!({"name": "photos"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(value["data"]["external_name"].as_str().unwrap().starts_with("dcn1"));

    let (status, value) = node.post("/api/v0/channels", json!({"name": "photos"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(value["error"]["stage"], "channel");

    let (_, value) = node
        .publish(&[("body", "a picture"), ("channel", "photos")], &[])
        .await;
    let cid = value["data"]["cid"].as_str().unwrap().to_string();

    let (_, value) = node.get("/api/v0/feed/history?channel=photos").await;
    assert_eq!(value["data"]["entries"][0]["cid"], cid.as_str());
    let (_, value) = node.get("/api/v0/feed/history").await;
    assert_eq!(value["data"]["entries"], json!([]));

    let (_, value) = node.get("/api/v0/channels").await;
    assert_eq!(value["data"].as_array().unwrap().len(), 2);

    let (status, _) = node.delete("/api/v0/channels/default").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = node.delete("/api/v0/channels/photos").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = node.delete("/api/v0/channels/photos").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = node.get("/api/v0/feed/history?channel=photos").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_follows() {
    let node = daemon().await;
    let name = name_for(&SecretKey::generate().public());

    let (status, value) = node
        .post("/api/v0/follows", json!({"external_name": "nonsense"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["stage"], "request");

    let (status, value) = node
        .post(
            "/api/v0/follows",
            json!({"external_name": name, "display_name": "alice"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = value["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(value["data"]["display_name"], "alice");
    assert_eq!(value["data"]["is_self"], false);

    let (status, _) = node
        .post("/api/v0/follows", json!({"external_name": name}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // the default channel is mirrored as a self follow
    let (_, value) = node.get("/api/v0/follows").await;
    let follows = value["data"].as_array().unwrap();
    assert_eq!(follows.len(), 2);
    assert_eq!(follows[0]["is_self"], true);

    let (_, value) = node.get("/api/v0/follows?skip=1&limit=5").await;
    assert_eq!(value["data"].as_array().unwrap().len(), 1);
    assert_eq!(value["data"][0]["id"], id.as_str());

    let (status, _) = node.delete(&format!("/api/v0/follows/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, value) = node.delete(&format!("/api/v0/follows/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["error"]["stage"], "follows");

    // following again restores the old row
    let (status, value) = node
        .post("/api/v0/follows", json!({"external_name": name}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["data"]["id"], id.as_str());
}

#[tokio::test]
async fn test_follow_listener_owns_a_poller() {
    let node = daemon().await;
    assert!(node.state.pollers().is_empty());

    let response = tower::ServiceExt::oneshot(
        node.router.clone(),
        Request::get("/api/v0/follows/listen")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(node.state.pollers().len(), 1);

    drop(response);
    assert!(node.state.pollers().is_empty());
}

#[tokio::test]
async fn test_peers_and_messages() {
    let node = daemon().await;
    let recipient = encode_recipient(&SecretKey::generate().public());

    let (status, value) = node
        .post(
            "/api/v0/peers",
            json!({"display_name": "bob", "recipient": "garbage"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["error"]["stage"], "recipients");

    let (status, value) = node
        .post(
            "/api/v0/peers",
            json!({"display_name": "bob", "recipient": recipient, "peer_id": "node-7"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = value["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(value["data"]["recipient"], recipient.as_str());

    let (_, value) = node.get("/api/v0/peers").await;
    assert_eq!(value["data"].as_array().unwrap().len(), 1);
    let (status, _) = node.delete(&format!("/api/v0/peers/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, value) = node.get("/api/v0/peers").await;
    assert_eq!(value["data"], json!([]));

    for body in ["first", "second", "third"] {
        let (status, _) = node
            .post("/api/v0/messages", json!({"sender": "bob", "body": body}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (_, value) = node.get("/api/v0/messages?limit=2").await;
    let messages = value["data"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["body"], "third");
    assert_eq!(messages[1]["body"], "second");
}

#[tokio::test]
async fn test_unlock_and_rotate() {
    let node = locked_daemon().await;

    let (_, value) = node.get("/api/v0/identity/recipient").await;
    assert_eq!(value["data"]["unlocked"], false);

    let (status, value) = node
        .post("/api/v0/identity/unlock", json!({"passphrase": "secret"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let original = value["data"]["recipient"].as_str().unwrap().to_string();

    let (status, value) = node
        .post("/api/v0/identity/unlock", json!({"passphrase": "wrong"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(value["error"]["stage"], "identity");

    let friend = encode_recipient(&SecretKey::generate().public());
    let (_, value) = node
        .publish(&[("body", "before rotation"), ("to", &friend)], &[])
        .await;
    let cid = value["data"]["cid"].as_str().unwrap().to_string();

    let (status, value) = node
        .post("/api/v0/identity/rotate", json!({"passphrase": "secret"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let rotated = value["data"]["recipient"].as_str().unwrap().to_string();
    assert_ne!(original, rotated);

    let (_, value) = node.get("/api/v0/identity/recipient").await;
    assert_eq!(value["data"]["recipient"], rotated.as_str());

    // older posts still decrypt with the kept key
    let (status, body) = node
        .request(
            Request::get(format!("/api/v0/feed/{}/post.json", cid))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let post: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(post["body"], "before rotation");

    // new posts are addressed to the new key only
    let (_, value) = node
        .publish(&[("body", "after rotation"), ("to", &friend)], &[])
        .await;
    let cid = value["data"]["cid"].as_str().unwrap();
    let (_, value) = node.get(&format!("/api/v0/feed/{}", cid)).await;
    let to = value["data"]["meta"]["to"].as_array().unwrap();
    assert!(to.iter().any(|r| r == rotated.as_str()));
    assert!(!to.iter().any(|r| r == original.as_str()));
}

#[tokio::test]
async fn test_status_routes() {
    let node = daemon().await;

    let (status, value) = node.get("/_status/livez").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "ok");

    let (status, value) = node.get("/_status/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "ok");

    let (status, value) = node.get("/_status/version").await;
    assert_eq!(status, StatusCode::OK);
    assert!(value["version"].is_string());

    let (status, value) = node
        .json(
            Request::get("/nowhere")
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["ok"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotations_keep_every_key() {
    let node = daemon().await;

    let rotations = (0..6).map(|_| {
        node.post(
            "/api/v0/identity/rotate",
            json!({"passphrase": common::PASSPHRASE}),
        )
    });
    let handed_out: Vec<String> = futures::future::join_all(rotations)
        .await
        .into_iter()
        .map(|(status, value)| {
            assert_eq!(status, StatusCode::OK, "{}", value);
            value["data"]["recipient"].as_str().unwrap().to_string()
        })
        .collect();

    let saved = IdentityStore::new(node.dir.path().join("identity.age"))
        .load(Some(common::PASSPHRASE))
        .unwrap();
    assert_eq!(saved.identities().len(), 7);
    let saved_keys: Vec<String> = saved
        .identities()
        .iter()
        .map(|key| encode_recipient(&key.public()))
        .collect();
    for recipient in &handed_out {
        assert!(saved_keys.contains(recipient));
    }

    // the key new posts go to is the one the file ends on
    let (_, value) = node.get("/api/v0/identity/recipient").await;
    assert_eq!(
        value["data"]["recipient"],
        encode_recipient(&saved.recipient()).as_str()
    );
}
