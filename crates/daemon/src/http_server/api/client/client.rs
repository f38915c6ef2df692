use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use serde_json::Value;
use url::Url;

use super::error::ApiError;
use super::ApiRequest;
use crate::http_server::api::response::Envelope;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    /// Send `request` and unwrap the response envelope.
    pub async fn call<T: ApiRequest>(&mut self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope<Value> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(ApiError::HttpStatus(status, text)),
            Err(e) => return Err(e.into()),
        };

        match envelope.error {
            Some(failure) => Err(ApiError::Failure {
                status,
                stage: failure.stage,
                message: failure.message,
            }),
            None if envelope.ok => Ok(serde_json::from_value(
                envelope.data.unwrap_or(Value::Null),
            )?),
            None => Err(ApiError::HttpStatus(status, text)),
        }
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
