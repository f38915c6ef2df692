use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::naming::{NameRecord, NameService, NamingError, ResolveHint};
use common::prelude::ContentAddress;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::response;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/:name", get(resolve_handler))
        .route("/:name/record", get(record_handler))
        .with_state(state)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveQuery {
    #[serde(default)]
    pub hint: ResolveHint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolved {
    pub name: String,
    pub value: ContentAddress,
}

pub async fn resolve_handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<impl IntoResponse, NamesError> {
    let value = state.names().resolve(&name, query.hint).await?;
    Ok(response::ok(Resolved { name, value }))
}

/// The signed record this node holds for `name`. Other daemons read this
/// to resolve names they do not own; it never asks further peers.
pub async fn record_handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, NamesError> {
    let record = state
        .names()
        .record(&name)
        .await?
        .ok_or_else(|| NamingError::NotPublished(name.clone()))?;
    Ok(response::ok(record))
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct NamesError(#[from] NamingError);

impl IntoResponse for NamesError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NamingError::NotPublished(_) | NamingError::UnknownKey(_) => StatusCode::NOT_FOUND,
            NamingError::InvalidName(_) => StatusCode::BAD_REQUEST,
            NamingError::Unreachable(_, _) | NamingError::BadSignature(_) => {
                StatusCode::BAD_GATEWAY
            }
            NamingError::StaleSequence { .. } => StatusCode::CONFLICT,
            NamingError::Backend(e) => {
                tracing::error!("naming backend error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        response::failure(status, "resolve", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRecordRequest {
    pub name: String,
}

impl ApiRequest for NameRecordRequest {
    type Response = NameRecord;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/api/v0/names/{}/record", self.name))?;
        Ok(client.get(full_url))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct ResolveRequest {
    /// Name to resolve
    pub name: String,

    /// Answer from the local record cache when possible
    #[arg(long)]
    #[serde(skip)]
    pub cached: bool,
}

impl ApiRequest for ResolveRequest {
    type Response = Resolved;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/api/v0/names/{}", self.name))?;
        let hint = if self.cached {
            ResolveHint::Cached
        } else {
            ResolveHint::Fresh
        };
        Ok(client.get(full_url).query(&ResolveQuery { hint }))
    }
}
