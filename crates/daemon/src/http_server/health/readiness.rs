use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::time::timeout;

use super::data_source::*;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// `200 {"status":"ok"}` once the directory database answers, `503` with a
/// reason otherwise.
#[tracing::instrument]
pub async fn handler(data_src: StateDataSource) -> Response {
    let message = match timeout(HEALTH_CHECK_TIMEOUT, data_src.is_ready()).await {
        Ok(Ok(())) => {
            return (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
        }
        Ok(Err(DataSourceError::DependencyFailure)) => "the directory database isn't available",
        Ok(Err(DataSourceError::ShuttingDown)) => "service is shutting down",
        Err(_) => "health check timed out",
    };
    tracing::warn!(reason = message, "not ready");
    let body = serde_json::json!({"status": "failure", "message": message});
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_body_util::BodyExt;

    use super::*;
    use crate::database::Database;
    use crate::http_server::health::data_source::tests::Unreachable;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ready_until_directory_closes() {
        let db = Database::in_memory().await.unwrap();
        let source = || StateDataSource::new(Arc::new(DbSource::new(db.clone())));

        let response = handler(source()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await["status"], "ok");

        db.close().await;
        let response = handler(source()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let value = body(response).await;
        assert_eq!(value["status"], "failure");
        assert_eq!(value["message"], "service is shutting down");
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let source = StateDataSource::new(Arc::new(Unreachable));
        let response = handler(source).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body(response).await["message"],
            "the directory database isn't available"
        );
    }
}
