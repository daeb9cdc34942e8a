// libs/messaging-cell/src/services/normalizer.rs
use shared_utils::phone::{is_group_jid, jid_to_digits};

use crate::models::{IgnoreReason, InboundEvent, InboundMessage, MessageContent, WebhookEvent};

const MESSAGE_EVENTS: [&str; 2] = ["messages.upsert", "messages.update"];

/// Turns a raw provider event into an [`InboundEvent`], or says why it is
/// not one. Event names are compared case-insensitively and with `_` read as
/// `.`, so `MESSAGES_UPSERT` is accepted.
pub fn normalize_event(event: WebhookEvent) -> Result<InboundEvent, IgnoreReason> {
    let event_name = event
        .event
        .as_deref()
        .map(|name| name.trim().to_lowercase().replace('_', "."))
        .ok_or(IgnoreReason::UnsupportedEvent)?;

    if !MESSAGE_EVENTS.contains(&event_name.as_str()) {
        return Err(IgnoreReason::UnsupportedEvent);
    }

    let instance = event
        .instance
        .map(|instance| instance.trim().to_string())
        .filter(|instance| !instance.is_empty())
        .ok_or(IgnoreReason::MissingInstance)?;

    let data = event.data.unwrap_or_default();
    let key = data.key.unwrap_or_default();

    let remote_jid = key
        .remote_jid
        .filter(|jid| !jid.trim().is_empty())
        .ok_or(IgnoreReason::MissingSender)?;

    if is_group_jid(&remote_jid) {
        return Err(IgnoreReason::GroupMessage);
    }
    if key.from_me.unwrap_or(false) {
        return Err(IgnoreReason::OwnMessage);
    }

    let sender_digits = jid_to_digits(&remote_jid);
    if sender_digits.is_empty() {
        return Err(IgnoreReason::MissingSender);
    }

    let message_id = key
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    Ok(InboundEvent {
        instance,
        message_id,
        sender_digits,
        message: extract_message(data.message.as_ref()),
    })
}

/// First non-empty of: plain text, extended text, poll vote.
pub fn extract_message(content: Option<&MessageContent>) -> InboundMessage {
    let Some(content) = content else {
        return InboundMessage::Unrecognized;
    };

    let non_empty = |text: &Option<String>| {
        text.as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };

    if let Some(text) = non_empty(&content.conversation) {
        return InboundMessage::Text(text);
    }

    if let Some(text) = content.extended_text_message.as_ref().and_then(|ext| non_empty(&ext.text)) {
        return InboundMessage::Text(text);
    }

    let selected: Vec<String> = content
        .poll_updates
        .iter()
        .flatten()
        .filter_map(|update| update.vote.as_ref())
        .filter_map(|vote| vote.selected_options.as_ref())
        .flatten()
        .filter_map(|option| non_empty(&option.name))
        .collect();

    if !selected.is_empty() {
        return InboundMessage::PollVote(selected);
    }

    InboundMessage::Unrecognized
}
