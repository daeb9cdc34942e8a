// libs/messaging-cell/src/services/channel.rs
use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use appointment_cell::services::notification::NotificationError;
use appointment_cell::services::store::CalendarStore;

use crate::models::{ChannelStatus, MessagingError};
use crate::services::evolution::EvolutionApiClient;

const CONNECTED_STATE: &str = "open";

pub struct ChannelStatusService {
    client: Option<Arc<EvolutionApiClient>>,
    store: Arc<dyn CalendarStore>,
}

impl ChannelStatusService {
    pub fn new(client: Option<Arc<EvolutionApiClient>>, store: Arc<dyn CalendarStore>) -> Self {
        Self { client, store }
    }

    /// Asks the provider whether the organization's instance is connected.
    #[instrument(skip(self))]
    pub async fn status(&self, organization_id: Uuid) -> Result<ChannelStatus, MessagingError> {
        let client = self.client.as_ref().ok_or(NotificationError::NotConfigured)?;

        let channel = self.store
            .get_channel(organization_id)
            .await?
            .ok_or(NotificationError::MissingBinding)?;

        let state = client
            .connection_state(&channel.instance_name, channel.api_key.as_deref())
            .await?;

        info!("Instance {} is {}", channel.instance_name, state.state);

        Ok(ChannelStatus {
            organization_id,
            instance_name: channel.instance_name,
            connected: state.state.eq_ignore_ascii_case(CONNECTED_STATE),
            state: state.state,
        })
    }
}
