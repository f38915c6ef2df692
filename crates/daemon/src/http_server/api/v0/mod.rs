use axum::Router;

pub mod channels;
pub mod feed;
pub mod follows;
pub mod identity;
pub mod messages;
pub mod names;
pub mod peers;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/feed", feed::router(state.clone()))
        .nest("/names", names::router(state.clone()))
        .nest("/channels", channels::router(state.clone()))
        .nest("/follows", follows::router(state.clone()))
        .nest("/peers", peers::router(state.clone()))
        .nest("/messages", messages::router(state.clone()))
        .nest("/identity", identity::router(state.clone()))
        .with_state(state)
}
