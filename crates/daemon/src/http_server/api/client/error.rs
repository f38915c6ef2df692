use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("{stage} failed ({status}): {message}")]
    Failure {
        status: StatusCode,
        stage: String,
        message: String,
    },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::HttpStatus(status, _) | ApiError::Failure { status, .. } => Some(*status),
            ApiError::Reqwest(e) => e.status(),
            _ => None,
        }
    }
}
