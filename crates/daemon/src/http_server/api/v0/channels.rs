use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::Router;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::directory::{Channel, DirectoryProvider};
use common::feed::{self, ChannelError};

use crate::database::DatabaseError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::response;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route("/:name", delete(remove_handler))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct CreateChannelRequest {
    /// Local channel name
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct ListChannelsRequest {}

pub async fn create_handler(
    State(state): State<ServiceState>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ChannelsError> {
    let name = req.name.trim();
    if name.is_empty() || name.contains('/') {
        return Err(ChannelsError::InvalidName(req.name));
    }

    let channel = feed::create_channel(state.database(), state.names().as_ref(), name).await?;
    Ok(response::with_status(StatusCode::CREATED, channel))
}

pub async fn list_handler(
    State(state): State<ServiceState>,
) -> Result<impl IntoResponse, ChannelsError> {
    let channels = state
        .database()
        .channels()
        .await
        .map_err(ChannelError::Directory)?;
    Ok(response::ok(channels))
}

pub async fn remove_handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ChannelsError> {
    if name == state.publisher().config().default_channel {
        return Err(ChannelsError::DefaultChannel(name));
    }
    let channel = feed::remove_channel(state.database(), state.names().as_ref(), &name).await?;
    Ok(response::ok(channel))
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelsError {
    #[error("invalid channel name '{0}'")]
    InvalidName(String),
    #[error("the default channel '{0}' cannot be removed")]
    DefaultChannel(String),
    #[error(transparent)]
    Channel(#[from] ChannelError<DatabaseError>),
}

impl IntoResponse for ChannelsError {
    fn into_response(self) -> Response {
        match self {
            ChannelsError::InvalidName(_) => {
                response::failure(StatusCode::BAD_REQUEST, "request", self)
            }
            ChannelsError::DefaultChannel(_) => {
                response::failure(StatusCode::CONFLICT, "channel", self)
            }
            ChannelsError::Channel(ChannelError::Directory(e)) => {
                response::directory_failure("channel", e)
            }
            ChannelsError::Channel(ChannelError::Naming(e)) => {
                tracing::error!("naming key error: {}", e);
                response::failure(StatusCode::INTERNAL_SERVER_ERROR, "naming", e)
            }
        }
    }
}

impl ApiRequest for CreateChannelRequest {
    type Response = Channel;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/channels")?;
        Ok(client.post(full_url).json(&self))
    }
}

impl ApiRequest for ListChannelsRequest {
    type Response = Vec<Channel>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/channels")?;
        Ok(client.get(full_url))
    }
}
