use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use common::directory::{DirectoryError, DirectoryProvider, Page};

use crate::database::DatabaseError;
use crate::http_server::api::response;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(list_handler).post(append_handler))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendMessageRequest {
    #[serde(default)]
    pub sender: Option<String>,
    pub body: String,
}

pub async fn append_handler(
    State(state): State<ServiceState>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<impl IntoResponse, MessagesError> {
    let message = state
        .database()
        .append_message(req.sender.as_deref(), &req.body)
        .await?;
    Ok(response::with_status(StatusCode::CREATED, message))
}

/// Newest first.
pub async fn list_handler(
    State(state): State<ServiceState>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, MessagesError> {
    Ok(response::ok(state.database().messages(page).await?))
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct MessagesError(#[from] DirectoryError<DatabaseError>);

impl IntoResponse for MessagesError {
    fn into_response(self) -> Response {
        response::directory_failure("messages", self.0)
    }
}
