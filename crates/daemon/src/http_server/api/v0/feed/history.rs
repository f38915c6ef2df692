use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use common::directory::{DirectoryError, DirectoryProvider};
use common::feed::{chain, ChainError, Meta, Post};
use common::prelude::ContentAddress;

use super::identities;
use crate::database::DatabaseError;
use crate::http_server::api::response;
use crate::ServiceState;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub channel: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub channel: String,
    pub name: String,
    pub head: Option<ContentAddress>,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub cid: ContentAddress,
    pub meta: Meta,
    /// `None` when the post is encrypted for someone else
    pub post: Option<Post>,
}

/// Walk a channel back from its cached head, newest first.
pub async fn handler(
    State(state): State<ServiceState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, HistoryError> {
    let channel_name = query
        .channel
        .unwrap_or_else(|| state.publisher().config().default_channel.clone());
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let channel = state
        .database()
        .channel(&channel_name)
        .await?
        .ok_or_else(|| HistoryError::ChannelNotFound(channel_name.clone()))?;

    let store = state.store().as_ref();
    let walked = match &channel.latest {
        Some(head) => chain::walk(store, head, limit).await?,
        None => Vec::new(),
    };

    let keys = identities(&state);
    let mut entries = Vec::with_capacity(walked.len());
    for (cid, meta) in walked {
        let post = match chain::read_post(store, &cid, &keys).await {
            Ok(post) => Some(post),
            Err(e) => {
                tracing::debug!(%cid, "post not readable: {}", e);
                None
            }
        };
        entries.push(HistoryEntry { cid, meta, post });
    }

    Ok(response::ok(History {
        channel: channel.name,
        name: channel.external_name,
        head: channel.latest,
        entries,
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("channel '{0}' not found")]
    ChannelNotFound(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError<DatabaseError>),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl IntoResponse for HistoryError {
    fn into_response(self) -> Response {
        match self {
            HistoryError::ChannelNotFound(_) => {
                response::failure(StatusCode::NOT_FOUND, "channel", self)
            }
            HistoryError::Directory(e) => response::directory_failure("channel", e),
            HistoryError::Chain(e) => {
                tracing::error!("failed to walk channel: {}", e);
                response::failure(StatusCode::INTERNAL_SERVER_ERROR, "chain", e)
            }
        }
    }
}
