// libs/messaging-cell/src/services/evolution.rs
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::json;
use tracing::{debug, error, info, warn};

use appointment_cell::services::notification::NotificationError;
use shared_config::AppConfig;

use crate::models::{ConnectionStateResponse, InstanceState};

/// Client for an Evolution-style WhatsApp HTTP API.
///
/// Sends are a single attempt bounded by the client timeout. Connection
/// state polls retry up to `max_attempts` with linear backoff.
#[derive(Debug)]
pub struct EvolutionApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl EvolutionApiClient {
    pub fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        if !config.is_messaging_configured() {
            return Err(NotificationError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.messaging_timeout_secs.max(1)))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.messaging_api_url.trim_end_matches('/').to_string(),
            api_key: config.messaging_api_key.clone(),
            max_attempts: config.messaging_max_attempts.max(1),
            retry_backoff: Duration::from_millis(500),
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// POST /message/sendText/{instance}
    pub async fn send_text(
        &self,
        instance: &str,
        instance_key: Option<&str>,
        number: &str,
        text: &str,
    ) -> Result<(), NotificationError> {
        let url = format!("{}/message/sendText/{}", self.base_url, urlencoding::encode(instance));
        debug!("Sending text through instance {}", instance);

        let request = self.authorized(self.client.post(&url), instance_key)
            .json(&json!({
                "number": number,
                "text": text,
            }));

        self.execute(request, "sendText").await?;
        info!("Text message delivered to provider for instance {}", instance);
        Ok(())
    }

    /// POST /message/sendPoll/{instance}
    pub async fn send_poll(
        &self,
        instance: &str,
        instance_key: Option<&str>,
        number: &str,
        question: &str,
        options: &[String],
    ) -> Result<(), NotificationError> {
        let url = format!("{}/message/sendPoll/{}", self.base_url, urlencoding::encode(instance));
        debug!("Sending poll through instance {}", instance);

        let request = self.authorized(self.client.post(&url), instance_key)
            .json(&json!({
                "number": number,
                "name": question,
                "selectableCount": 1,
                "values": options,
            }));

        self.execute(request, "sendPoll").await?;
        info!("Poll delivered to provider for instance {}", instance);
        Ok(())
    }

    /// GET /instance/connectionState/{instance}
    pub async fn connection_state(
        &self,
        instance: &str,
        instance_key: Option<&str>,
    ) -> Result<InstanceState, NotificationError> {
        let url = format!(
            "{}/instance/connectionState/{}",
            self.base_url,
            urlencoding::encode(instance)
        );

        let mut last_error = NotificationError::Transport("no attempt made".to_string());

        for attempt in 1..=self.max_attempts {
            debug!("Connection state attempt {}/{} for {}", attempt, self.max_attempts, instance);

            let request = self.authorized(self.client.get(&url), instance_key);
            match self.execute(request, "connectionState").await {
                Ok(body) => {
                    let parsed: ConnectionStateResponse = serde_json::from_str(&body)
                        .map_err(|e| NotificationError::Provider {
                            status: 200,
                            message: format!("Failed to parse connection state: {}", e),
                        })?;
                    return Ok(parsed.instance);
                }
                Err(e) => {
                    warn!("Connection state attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    last_error = e;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    fn authorized(&self, request: RequestBuilder, instance_key: Option<&str>) -> RequestBuilder {
        let key = instance_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(self.api_key.as_str());
        request.header("apikey", key)
    }

    async fn execute(&self, request: RequestBuilder, operation: &str) -> Result<String, NotificationError> {
        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        if !status.is_success() {
            error!("Provider {} failed: {} - {}", operation, status, body);
            return Err(NotificationError::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(body)
    }
}
