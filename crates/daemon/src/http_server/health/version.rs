use axum::response::IntoResponse;
use axum::Json;

pub async fn handler() -> impl IntoResponse {
    Json(common::build_info!())
}
