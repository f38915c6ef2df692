//! Shared harness for daemon API tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceExt;
use url::Url;

use dchannel_daemon::http_server::{self, Config};
use dchannel_daemon::{ServiceConfig, ServiceState};

pub const PASSPHRASE: &str = "correct horse battery staple";
const BOUNDARY: &str = "dchannel-test-boundary";

pub struct TestDaemon {
    pub state: ServiceState,
    pub router: Router,
    pub dir: TempDir,
    shutdown: watch::Sender<()>,
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// An in-memory daemon with an unlocked identity.
pub async fn daemon() -> TestDaemon {
    daemon_with(|config| config.unlock = Some(Some(PASSPHRASE.to_string()))).await
}

/// An in-memory daemon nobody has unlocked yet.
pub async fn locked_daemon() -> TestDaemon {
    daemon_with(|_| {}).await
}

pub async fn daemon_with(configure: impl FnOnce(&mut ServiceConfig)) -> TestDaemon {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServiceConfig::ephemeral(dir.path().to_path_buf());
    configure(&mut config);

    let (state, worker) = ServiceState::from_config(&config).await.unwrap();
    let (shutdown, shutdown_rx) = watch::channel(());
    tokio::spawn(worker.run(shutdown_rx));

    let router = http_server::router(http_config(), state.clone());
    TestDaemon {
        state,
        router,
        dir,
        shutdown,
    }
}

fn http_config() -> Config {
    Config::new(SocketAddr::from(([127, 0, 0, 1], 0)), tracing::Level::DEBUG)
}

impl TestDaemon {
    /// Serve the daemon on a local port, for peers that talk to it over
    /// HTTP.
    pub async fn listen(&self) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = self.state.clone();
        let shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            http_server::serve(listener, http_config(), state, shutdown_rx)
                .await
                .unwrap();
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    pub async fn request(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.request(request).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.json(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.json(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.json(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// `POST /api/v0/feed/publish` with the given text fields and files.
    pub async fn publish(&self, fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> (StatusCode, Value) {
        self.json(
            Request::post("/api/v0/feed/publish")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart(fields, files)))
                .unwrap(),
        )
        .await
    }

    /// Publish a public post and return its address.
    pub async fn publish_text(&self, body: &str) -> String {
        let (status, value) = self.publish(&[("body", body)], &[]).await;
        assert_eq!(status, StatusCode::OK, "{}", value);
        value["data"]["cid"].as_str().unwrap().to_string()
    }

    /// The external name of the default channel.
    pub async fn channel_name(&self) -> String {
        let (_, value) = self.get("/api/v0/channels").await;
        value["data"][0]["external_name"].as_str().unwrap().to_string()
    }

    /// Wait for the name worker to publish `cid` under `name`.
    pub async fn wait_for_name(&self, name: &str, cid: &str) {
        let uri = format!("/api/v0/names/{}?hint=cached", name);
        for _ in 0..100 {
            let (status, value) = self.get(&uri).await;
            if status == StatusCode::OK && value["data"]["value"] == cid {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never resolved to {}", name, cid);
    }
}

fn multipart(fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
