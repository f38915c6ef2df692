use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use common::crypto::EnvelopeError;
use common::feed::{chain, ChainError, Meta};
use common::prelude::ContentAddress;
use object_store::BundleStoreError;

use super::identities;
use crate::http_server::api::response;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub cid: ContentAddress,
    pub files: Vec<String>,
    pub meta: Meta,
}

/// Files of one post bundle plus its (never encrypted) meta.
pub async fn listing_handler(
    State(state): State<ServiceState>,
    Path(cid): Path<String>,
) -> Result<impl IntoResponse, GetError> {
    let cid = parse_cid(&cid)?;
    let store = state.store().as_ref();
    let files = chain::list(store, &cid).await?;
    let meta = chain::read_meta(store, &cid).await?;
    pin(&state, &cid).await;

    Ok(response::ok(FeedEntry { cid, files, meta }))
}

/// Raw bytes of one file, decrypted with the unlocked identity when it is
/// an envelope and passed through otherwise.
pub async fn file_handler(
    State(state): State<ServiceState>,
    Path((cid, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, GetError> {
    let cid = parse_cid(&cid)?;
    let name = path.trim_start_matches('/');
    let bytes = chain::read_file(state.store().as_ref(), &cid, name, &identities(&state)).await?;
    pin(&state, &cid).await;

    let mime = mime_guess::from_path(name).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime.to_string())],
        bytes,
    ))
}

fn parse_cid(cid: &str) -> Result<ContentAddress, GetError> {
    cid.parse()
        .map_err(|e: object_store::AddressError| GetError::InvalidAddress(e.to_string()))
}

/// Keep what we read around. Failures only get logged.
async fn pin(state: &ServiceState, cid: &ContentAddress) {
    if let Err(e) = state.store().pin(cid).await {
        tracing::warn!(%cid, "failed to pin bundle: {}", e);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("invalid content address: {0}")]
    InvalidAddress(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl IntoResponse for GetError {
    fn into_response(self) -> Response {
        match self {
            GetError::InvalidAddress(msg) => {
                response::failure(StatusCode::BAD_REQUEST, "request", msg)
            }
            GetError::Chain(ChainError::Store(BundleStoreError::NotFound(what))) => {
                response::failure(StatusCode::NOT_FOUND, "store", format!("not found: {}", what))
            }
            GetError::Chain(ChainError::Decryption(EnvelopeError::NoMatchingIdentity)) => {
                response::failure(
                    StatusCode::FORBIDDEN,
                    "decrypt",
                    EnvelopeError::NoMatchingIdentity,
                )
            }
            GetError::Chain(e) => {
                tracing::error!("failed to read bundle: {}", e);
                response::failure(StatusCode::INTERNAL_SERVER_ERROR, "store", "failed to read bundle")
            }
        }
    }
}
