// libs/messaging-cell/src/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use appointment_cell::models::AppointmentError;
use appointment_cell::services::notification::NotificationError;

// ==============================================================================
// PROVIDER WEBHOOK PAYLOAD
// ==============================================================================
//
// Every field is optional: providers send several shapes for the same event
// and omit whatever does not apply.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub key: Option<MessageKey>,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default, rename = "pushName")]
    pub push_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageKey {
    #[serde(default, rename = "remoteJid")]
    pub remote_jid: Option<String>,
    #[serde(default, rename = "fromMe")]
    pub from_me: Option<bool>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default, rename = "extendedTextMessage")]
    pub extended_text_message: Option<ExtendedTextMessage>,
    #[serde(default, rename = "pollUpdates")]
    pub poll_updates: Option<Vec<PollUpdate>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedTextMessage {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollUpdate {
    #[serde(default)]
    pub vote: Option<PollVote>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollVote {
    #[serde(default, rename = "selectedOptions")]
    pub selected_options: Option<Vec<PollOption>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollOption {
    #[serde(default)]
    pub name: Option<String>,
}

// ==============================================================================
// NORMALIZED INBOUND MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    /// Names of the selected poll options.
    PollVote(Vec<String>),
    Unrecognized,
}

/// A message-delivery event from a customer, stripped of provider JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub instance: String,
    /// Provider message id, when the payload carries one.
    pub message_id: Option<String>,
    pub sender_digits: String,
    pub message: InboundMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Malformed,
    UnsupportedEvent,
    MissingInstance,
    MissingSender,
    GroupMessage,
    OwnMessage,
    UnrecognizedContent,
    NoIntent,
    UnknownInstance,
    UnknownSender,
    NoActionableAppointment,
    Duplicate,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IgnoreReason::Malformed => "malformed payload",
            IgnoreReason::UnsupportedEvent => "not a message event",
            IgnoreReason::MissingInstance => "no instance",
            IgnoreReason::MissingSender => "no sender",
            IgnoreReason::GroupMessage => "group message",
            IgnoreReason::OwnMessage => "sent by us",
            IgnoreReason::UnrecognizedContent => "no text or poll vote",
            IgnoreReason::NoIntent => "no confirm or cancel intent",
            IgnoreReason::UnknownInstance => "instance not bound to an organization",
            IgnoreReason::UnknownSender => "sender is not a customer",
            IgnoreReason::NoActionableAppointment => "no appointment to act on",
            IgnoreReason::Duplicate => "message already processed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Confirm,
    Cancel,
    Unknown,
}

/// What the webhook did with one event. Serialized as the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored {
        reason: IgnoreReason,
    },
    Confirmed {
        appointment_id: Uuid,
        already_confirmed: bool,
    },
    Canceled {
        appointment_id: Uuid,
        suggested_day: NaiveDate,
        suggested_hours: Vec<u32>,
    },
}

impl WebhookOutcome {
    pub fn ignored(reason: IgnoreReason) -> Self {
        WebhookOutcome::Ignored { reason }
    }
}

// ==============================================================================
// CHANNEL STATUS
// ==============================================================================

/// `GET /instance/connectionState/{instance}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStateResponse {
    pub instance: InstanceState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    #[serde(default, rename = "instanceName")]
    pub instance_name: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub organization_id: Uuid,
    pub instance_name: String,
    pub state: String,
    pub connected: bool,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessagingError {
    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}
