// libs/messaging-cell/src/services/sender.rs
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use appointment_cell::services::notification::{
    MessageBody, NotificationError, NotificationSender, OutboundNotification,
};
use appointment_cell::services::store::CalendarStore;
use shared_utils::phone::normalize_for_send;

use crate::services::evolution::EvolutionApiClient;

/// Delivers notifications through the organization's bound provider instance.
pub struct EvolutionNotificationSender {
    client: Option<Arc<EvolutionApiClient>>,
    store: Arc<dyn CalendarStore>,
    country_code: String,
}

impl EvolutionNotificationSender {
    /// `client = None` keeps the service running without a provider; every
    /// send then fails with `NotConfigured`.
    pub fn new(
        client: Option<Arc<EvolutionApiClient>>,
        store: Arc<dyn CalendarStore>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            country_code: country_code.into(),
        }
    }
}

#[async_trait]
impl NotificationSender for EvolutionNotificationSender {
    async fn send(&self, notification: &OutboundNotification) -> Result<(), NotificationError> {
        let client = self.client.as_ref().ok_or(NotificationError::NotConfigured)?;

        let channel = self.store
            .get_channel(notification.organization_id)
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?
            .ok_or_else(|| {
                warn!("Organization {} has no messaging channel", notification.organization_id);
                NotificationError::MissingBinding
            })?;

        let number = normalize_for_send(&notification.phone, &self.country_code)
            .ok_or_else(|| NotificationError::InvalidRecipient(notification.phone.clone()))?;

        debug!("Sending message to {} via {}", number, channel.instance_name);

        let instance_key = channel.api_key.as_deref();
        match &notification.body {
            MessageBody::Text(text) => {
                client.send_text(&channel.instance_name, instance_key, &number, text).await
            }
            MessageBody::Poll { question, options } => {
                client.send_poll(&channel.instance_name, instance_key, &number, question, options).await
            }
        }
    }
}
