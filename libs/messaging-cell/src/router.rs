// libs/messaging-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{self, MessagingState};

pub fn messaging_routes(state: Arc<MessagingState>) -> Router {
    Router::new()
        // Provider callbacks
        .route("/webhooks/messaging", post(handlers::receive_webhook))

        // Channel
        .route("/organizations/{organization_id}/channel/status", get(handlers::channel_status))
        .with_state(state)
}
