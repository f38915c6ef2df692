use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::crypto::{encode_recipient, EnvelopeError, PublicKey};
use common::identity::IdentityError;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::response;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/unlock", post(unlock_handler))
        .route("/rotate", post(rotate_handler))
        .route("/recipient", get(recipient_handler))
        .with_state(state)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct UnlockRequest {
    /// Passphrase protecting the identity file
    #[arg(long, env = "DCHANNEL_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotateRequest {
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientResponse {
    pub unlocked: bool,
    /// Current recipient key, present once unlocked
    pub recipient: Option<String>,
}

impl RecipientResponse {
    fn unlocked(key: PublicKey) -> Self {
        Self {
            unlocked: true,
            recipient: Some(encode_recipient(&key)),
        }
    }
}

/// Open the identity file (creating it on first use) and make it current.
pub async fn unlock_handler(
    State(state): State<ServiceState>,
    Json(req): Json<UnlockRequest>,
) -> Result<impl IntoResponse, IdentityApiError> {
    let key = tokio::task::spawn_blocking(move || state.unlock(req.passphrase.as_deref()))
        .await
        .map_err(|e| IdentityApiError::Task(e.to_string()))??;
    tracing::info!(recipient = %encode_recipient(&key), "identity unlocked");
    Ok(response::ok(RecipientResponse::unlocked(key)))
}

/// Add a new current key. Older keys stay for reading old posts.
pub async fn rotate_handler(
    State(state): State<ServiceState>,
    Json(req): Json<RotateRequest>,
) -> Result<impl IntoResponse, IdentityApiError> {
    let key = tokio::task::spawn_blocking(move || state.rotate(req.passphrase.as_deref()))
        .await
        .map_err(|e| IdentityApiError::Task(e.to_string()))??;
    tracing::info!(recipient = %encode_recipient(&key), "identity rotated");
    Ok(response::ok(RecipientResponse::unlocked(key)))
}

pub async fn recipient_handler(State(state): State<ServiceState>) -> impl IntoResponse {
    let body = match state.identity().current() {
        Ok(keyring) => RecipientResponse::unlocked(keyring.recipient()),
        Err(_) => RecipientResponse {
            unlocked: false,
            recipient: None,
        },
    };
    response::ok(body)
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityApiError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("identity task failed: {0}")]
    Task(String),
}

impl IntoResponse for IdentityApiError {
    fn into_response(self) -> Response {
        match self {
            IdentityApiError::Identity(IdentityError::Decryption(
                EnvelopeError::NoMatchingIdentity,
            )) => response::failure(StatusCode::UNAUTHORIZED, "identity", "wrong passphrase"),
            e => {
                tracing::error!("identity error: {}", e);
                response::failure(StatusCode::INTERNAL_SERVER_ERROR, "identity", e)
            }
        }
    }
}

impl ApiRequest for UnlockRequest {
    type Response = RecipientResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/identity/unlock")?;
        Ok(client.post(full_url).json(&self))
    }
}
