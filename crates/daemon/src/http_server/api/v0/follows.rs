use std::convert::Infallible;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::Router;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use common::directory::{DirectoryError, DirectoryProvider, Follow, Page};
use common::feed::{notification_channel, PollerRegistry};
use common::naming::owner_of;

use crate::database::DatabaseError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::response;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(list_handler).post(add_handler))
        .route("/listen", get(listen_handler))
        .route("/:id", delete(remove_handler))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct AddFollowRequest {
    /// External name of the channel to follow
    pub external_name: String,

    /// Local display name (defaults to the external name)
    #[arg(long = "as")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct ListFollowsRequest {
    #[arg(long, default_value_t = 0)]
    pub skip: u32,

    #[arg(long, default_value_t = common::directory::DEFAULT_PAGE_LIMIT)]
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct RemoveFollowRequest {
    /// Follow id
    pub id: Uuid,
}

pub async fn add_handler(
    State(state): State<ServiceState>,
    Json(req): Json<AddFollowRequest>,
) -> Result<impl IntoResponse, FollowsError> {
    let external_name = req.external_name.trim();
    if owner_of(external_name).is_err() {
        return Err(FollowsError::InvalidName(req.external_name));
    }
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(external_name);

    let follow = state
        .database()
        .add_follow(display_name, external_name)
        .await?;
    tracing::info!(follow = %follow.display_name, name = %follow.external_name, "following");
    Ok(response::with_status(StatusCode::CREATED, follow))
}

pub async fn list_handler(
    State(state): State<ServiceState>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, FollowsError> {
    let follows = state.database().follows(page).await?;
    Ok(response::ok(follows))
}

pub async fn remove_handler(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, FollowsError> {
    state.database().remove_follow(id).await?;
    Ok(response::ok(()))
}

/// Stops the subscription's poller once the client goes away.
struct Subscription {
    pollers: PollerRegistry,
    id: Uuid,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::debug!(subscription = %self.id, "follow listener disconnected");
        self.pollers.stop(self.id);
    }
}

/// Server-sent events, one `message` per updated follow. Each listener
/// owns its own poller for as long as it stays connected.
pub async fn listen_handler(
    State(state): State<ServiceState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sink, notifications) = notification_channel();
    let handle = state.poller().spawn(sink.with_alert(state.alert()));
    let id = state.pollers().insert(handle);
    tracing::debug!(subscription = %id, "follow listener connected");

    let subscription = Subscription {
        pollers: state.pollers().clone(),
        id,
    };
    let stream = notifications.into_stream().filter_map(move |follow: Follow| {
        let _ = &subscription;
        let event = match Event::default().event("message").json_data(&follow) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!(follow = %follow.id, "failed to encode follow event: {}", e);
                None
            }
        };
        futures::future::ready(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, thiserror::Error)]
pub enum FollowsError {
    #[error("'{0}' is not a channel name")]
    InvalidName(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError<DatabaseError>),
}

impl IntoResponse for FollowsError {
    fn into_response(self) -> Response {
        match self {
            FollowsError::InvalidName(_) => {
                response::failure(StatusCode::BAD_REQUEST, "request", self)
            }
            FollowsError::Directory(e) => response::directory_failure("follows", e),
        }
    }
}

impl ApiRequest for AddFollowRequest {
    type Response = Follow;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/follows")?;
        Ok(client.post(full_url).json(&self))
    }
}

impl ApiRequest for ListFollowsRequest {
    type Response = Vec<Follow>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/follows")?;
        Ok(client.get(full_url).query(&Page::new(self.skip, self.limit)))
    }
}

impl ApiRequest for RemoveFollowRequest {
    type Response = ();

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/api/v0/follows/{}", self.id))?;
        Ok(client.delete(full_url))
    }
}
