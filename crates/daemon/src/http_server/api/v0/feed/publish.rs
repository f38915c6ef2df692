use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use common::feed::{self, Attachment, PostRecord, PublishError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::response;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct PublishRequest {
    /// Post body
    pub body: String,

    /// Channel to publish on (the default channel when omitted)
    #[arg(long)]
    pub channel: Option<String>,

    /// Post type
    #[arg(long = "type")]
    pub post_type: Option<String>,

    /// Recipient key, repeat for several. Without any the post is public
    #[arg(long = "to")]
    pub to: Vec<String>,

    /// Start a new chain instead of linking to the channel head
    #[arg(long)]
    pub genesis: bool,

    /// File to attach, repeat for several
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,

    #[arg(skip)]
    #[serde(skip)]
    pub attachments: Vec<(String, Vec<u8>)>,
}

impl PublishRequest {
    /// Read every `--file` into an attachment named after the file.
    pub async fn load_files(&mut self) -> Result<(), std::io::Error> {
        for path in &self.files {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("{} has no file name", path.display()),
                    )
                })?;
            let data = tokio::fs::read(path).await?;
            self.attachments.push((name, data));
        }
        Ok(())
    }
}

pub async fn handler(
    State(state): State<ServiceState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, PublishApiError> {
    let mut request = feed::PublishRequest::default();
    let mut body: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PublishApiError::Multipart(e.to_string()))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "body" => body = Some(text(field).await?),
            "channel" => request.channel = Some(text(field).await?).filter(|c| !c.is_empty()),
            "type" => request.post_type = Some(text(field).await?).filter(|t| !t.is_empty()),
            "to" => {
                let to = text(field).await?;
                if !to.trim().is_empty() {
                    request.recipients.push(to.trim().to_string());
                }
            }
            "genesis" => {
                let flag = text(field).await?;
                request.genesis = matches!(flag.trim(), "true" | "1" | "yes" | "on");
            }
            "file" | "files" => {
                let name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| PublishApiError::InvalidRequest("file without a name".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| PublishApiError::Multipart(e.to_string()))?;
                request.attachments.push(Attachment::new(name, data));
            }
            _ => {
                tracing::warn!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    request.body = body.ok_or_else(|| PublishApiError::InvalidRequest("body is required".into()))?;

    let record = state.publisher().publish(request).await?;
    Ok(response::ok(record))
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, PublishApiError> {
    field
        .text()
        .await
        .map_err(|e| PublishApiError::Multipart(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum PublishApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("multipart error: {0}")]
    Multipart(String),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl IntoResponse for PublishApiError {
    fn into_response(self) -> Response {
        match self {
            PublishApiError::InvalidRequest(msg) | PublishApiError::Multipart(msg) => {
                response::failure(StatusCode::BAD_REQUEST, "request", msg)
            }
            PublishApiError::Publish(e) => {
                let status = match &e {
                    PublishError::KeyNotReady(_) => StatusCode::LOCKED,
                    PublishError::RecipientParse(_)
                    | PublishError::FilenameConflict(_)
                    | PublishError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
                    PublishError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
                    PublishError::UploadTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(stage = e.stage(), "publish failed: {}", e);
                }
                response::failure(status, e.stage(), e)
            }
        }
    }
}

impl ApiRequest for PublishRequest {
    type Response = PostRecord;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/api/v0/feed/publish")?;

        let mut form = Form::new().text("body", self.body);
        if let Some(channel) = self.channel {
            form = form.text("channel", channel);
        }
        if let Some(post_type) = self.post_type {
            form = form.text("type", post_type);
        }
        for to in self.to {
            form = form.text("to", to);
        }
        if self.genesis {
            form = form.text("genesis", "true");
        }
        for (name, data) in self.attachments {
            form = form.part("file", Part::bytes(data).file_name(name));
        }

        Ok(client.post(full_url).multipart(form))
    }
}
