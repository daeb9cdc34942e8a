// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

/// One outbound message to a customer over the organization's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundNotification {
    pub organization_id: Uuid,
    /// As stored on the customer; the sender normalizes before delivery.
    pub phone: String,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    /// Single-choice poll; votes come back through the webhook.
    Poll { question: String, options: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationError {
    #[error("Messaging provider is not configured")]
    NotConfigured,

    #[error("Organization has no messaging channel binding")]
    MissingBinding,

    #[error("Invalid recipient phone: {0}")]
    InvalidRecipient(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &OutboundNotification) -> Result<(), NotificationError>;
}

/// A send that did not go through. Reported on the failure channel only.
#[derive(Debug, Clone)]
pub struct NotificationFailure {
    pub notification: OutboundNotification,
    pub error: NotificationError,
}

/// Fire-and-forget delivery. `dispatch` returns immediately; each send runs
/// on its own task once a permit is free, and a failed send is reported on
/// the failure channel. No retries.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Arc<dyn NotificationSender>,
    permits: Arc<Semaphore>,
    failures: mpsc::UnboundedSender<NotificationFailure>,
}

impl NotificationDispatcher {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        concurrency: usize,
    ) -> (Self, mpsc::UnboundedReceiver<NotificationFailure>) {
        let (failures, receiver) = mpsc::unbounded_channel();
        let dispatcher = Self {
            sender,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            failures,
        };
        (dispatcher, receiver)
    }

    /// Builds a dispatcher whose failures are drained into the log.
    pub fn with_failure_logging(sender: Arc<dyn NotificationSender>, concurrency: usize) -> Self {
        let (dispatcher, receiver) = Self::new(sender, concurrency);
        spawn_failure_logger(receiver);
        dispatcher
    }

    pub fn dispatch(&self, notification: OutboundNotification) {
        let sender = Arc::clone(&self.sender);
        let permits = Arc::clone(&self.permits);
        let failures = self.failures.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            debug!("Sending notification to organization {} customer", notification.organization_id);
            if let Err(error) = sender.send(&notification).await {
                // Receiver gone means nobody is listening; nothing else to do
                let _ = failures.send(NotificationFailure { notification, error });
            }
        });
    }
}

pub fn spawn_failure_logger(mut receiver: mpsc::UnboundedReceiver<NotificationFailure>) {
    tokio::spawn(async move {
        while let Some(failure) = receiver.recv().await {
            warn!(
                organization_id = %failure.notification.organization_id,
                error = %failure.error,
                "Outbound notification failed"
            );
        }
    });
}
