use axum::routing::{get, post};
use axum::Router;

use common::crypto::Identity;

pub mod get;
pub mod history;
pub mod publish;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/publish", post(publish::handler))
        .route("/history", get(history::handler))
        .route("/:cid", get(get::listing_handler))
        .route("/:cid/*path", get(get::file_handler))
        .with_state(state)
}

/// Keys of the unlocked identity, or none. Plaintext files still read
/// without any.
fn identities(state: &ServiceState) -> Vec<Identity> {
    state
        .identity()
        .current()
        .map(|keyring| keyring.decryption_identities())
        .unwrap_or_default()
}
