use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::crypto::{parse_recipient, RecipientParseError};
use common::directory::{DirectoryError, DirectoryProvider, NewPeer, Page};

use crate::database::DatabaseError;
use crate::http_server::api::response;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(list_handler).post(add_handler))
        .route("/:id", delete(remove_handler))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPeerRequest {
    pub display_name: String,
    /// Recipient key in canonical text form
    pub recipient: String,
    #[serde(default)]
    pub peer_id: Option<String>,
}

pub async fn add_handler(
    State(state): State<ServiceState>,
    Json(req): Json<AddPeerRequest>,
) -> Result<impl IntoResponse, PeersError> {
    let recipient = parse_recipient(req.recipient.trim())?;
    let peer = state
        .database()
        .add_peer(NewPeer {
            display_name: req.display_name,
            recipient,
            peer_id: req.peer_id,
        })
        .await?;
    Ok(response::with_status(StatusCode::CREATED, peer))
}

pub async fn list_handler(
    State(state): State<ServiceState>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, PeersError> {
    Ok(response::ok(state.database().peers(page).await?))
}

pub async fn remove_handler(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, PeersError> {
    state.database().remove_peer(id).await?;
    Ok(response::ok(()))
}

#[derive(Debug, thiserror::Error)]
pub enum PeersError {
    #[error(transparent)]
    Recipient(#[from] RecipientParseError),
    #[error(transparent)]
    Directory(#[from] DirectoryError<DatabaseError>),
}

impl IntoResponse for PeersError {
    fn into_response(self) -> Response {
        match self {
            PeersError::Recipient(e) => response::failure(StatusCode::BAD_REQUEST, "recipients", e),
            PeersError::Directory(e) => response::directory_failure("peers", e),
        }
    }
}
