//! The uniform JSON envelope every API response is wrapped in.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::directory::DirectoryError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub stage: String,
    pub message: String,
}

/// `200 {"ok": true, "data": ..}`
pub fn ok<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::OK, data)
}

pub fn with_status<T: Serialize>(status: StatusCode, data: T) -> Response {
    let envelope = Envelope {
        ok: true,
        data: Some(data),
        error: None,
    };
    (status, Json(envelope)).into_response()
}

/// `{"ok": false, "error": {"stage": .., "message": ..}}`
pub fn failure(status: StatusCode, stage: &str, message: impl ToString) -> Response {
    let envelope: Envelope<()> = Envelope {
        ok: false,
        data: None,
        error: Some(Failure {
            stage: stage.to_string(),
            message: message.to_string(),
        }),
    };
    (status, Json(envelope)).into_response()
}

/// Status for a directory failure. Provider errors are internal and
/// their text is not forwarded.
pub fn directory_failure<T: std::error::Error>(stage: &str, err: DirectoryError<T>) -> Response {
    match err {
        DirectoryError::Provider(e) => {
            tracing::error!(%stage, "directory error: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, stage, "directory unavailable")
        }
        DirectoryError::ChannelExists(_) | DirectoryError::FollowExists(_) => {
            failure(StatusCode::CONFLICT, stage, err)
        }
        DirectoryError::ChannelNotFound(_)
        | DirectoryError::FollowNotFound(_)
        | DirectoryError::PeerNotFound(_) => failure(StatusCode::NOT_FOUND, stage, err),
    }
}
