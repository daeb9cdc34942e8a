// libs/messaging-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use tracing::{debug, error};
use uuid::Uuid;

use appointment_cell::services::notification::NotificationError;
use shared_models::error::AppError;

use crate::models::{ChannelStatus, IgnoreReason, MessagingError, WebhookEvent, WebhookOutcome};
use crate::services::{ChannelStatusService, WebhookDispatcher};

pub struct MessagingState {
    pub dispatcher: Arc<WebhookDispatcher>,
    pub channel: Arc<ChannelStatusService>,
}

impl From<MessagingError> for AppError {
    fn from(error: MessagingError) -> Self {
        match error {
            MessagingError::Appointment(inner) => AppError::from(inner),
            MessagingError::Notification(NotificationError::MissingBinding) => {
                AppError::NotFound("Organization has no messaging channel".to_string())
            }
            MessagingError::Notification(inner) => AppError::ExternalService(inner.to_string()),
        }
    }
}

/// Provider webhook. Anything that is not actionable still gets a 200 so the
/// provider does not retry it; only processing failures return 500.
pub async fn receive_webhook(
    State(state): State<Arc<MessagingState>>,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, AppError> {
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            debug!("Unparseable webhook payload: {}", e);
            return Ok(Json(WebhookOutcome::ignored(IgnoreReason::Malformed)));
        }
    };

    match state.dispatcher.handle_event(event).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!("Webhook processing failed: {}", e);
            Err(AppError::Internal(e.to_string()))
        }
    }
}

pub async fn channel_status(
    State(state): State<Arc<MessagingState>>,
    Path(organization_id): Path<Uuid>,
) -> Result<Json<ChannelStatus>, AppError> {
    let status = state.channel.status(organization_id).await?;
    Ok(Json(status))
}
