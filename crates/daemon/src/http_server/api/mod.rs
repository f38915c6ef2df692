use axum::Router;

pub mod client;
pub mod response;
pub mod v0;

use crate::ServiceState;

const V0_PREFIX: &str = "/v0";

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest(V0_PREFIX, v0::router(state.clone()))
        .with_state(state)
}
