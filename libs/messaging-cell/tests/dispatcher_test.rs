use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::notification::{MessageBody, NotificationDispatcher};
use appointment_cell::services::slots::SlotRecommendationService;
use appointment_cell::test_utils::{InMemoryCalendarStore, RecordingNotificationSender};
use messaging_cell::models::{IgnoreReason, MessagingError, WebhookEvent, WebhookOutcome};
use messaging_cell::services::{IntentClassifier, WebhookDispatcher, WebhookSettings};
use shared_utils::phone::PhoneMatchPolicy;
use shared_utils::test_utils::wait_until;

const SENDER_JID: &str = "5511987654321@s.whatsapp.net";

struct Fixture {
    store: Arc<InMemoryCalendarStore>,
    sender: Arc<RecordingNotificationSender>,
    booking: Arc<AppointmentBookingService>,
    webhook: WebhookDispatcher,
    organization_id: Uuid,
    service: Service,
    customer: Customer,
}

async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryCalendarStore::new());
    let sender = Arc::new(RecordingNotificationSender::new());
    let (dispatcher, _failures) = NotificationDispatcher::new(sender.clone(), 4);
    let offset = FixedOffset::east_opt(0).unwrap();

    let organization_id = Uuid::new_v4();
    store.add_channel(organization_id, "clinica").await;
    let service = store.add_service(organization_id, "Limpeza", 30).await;
    let customer = store.add_customer(organization_id, "Maria", Some("(11) 98765-4321")).await;

    let booking = Arc::new(AppointmentBookingService::new(store.clone(), dispatcher, offset));
    let slots = Arc::new(SlotRecommendationService::new(store.clone(), offset));

    let webhook = WebhookDispatcher::new(
        booking.clone(),
        slots,
        IntentClassifier::default(),
        settings(),
    );

    Fixture { store, sender, booking, webhook, organization_id, service, customer }
}

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
}

fn now() -> DateTime<Utc> {
    at(10, 8, 0)
}

/// A fresh delivery: every call gets its own provider message id.
fn text_event(instance: &str, jid: &str, text: &str) -> WebhookEvent {
    text_event_with_id(instance, jid, text, &Uuid::new_v4().simple().to_string())
}

fn text_event_with_id(instance: &str, jid: &str, text: &str, message_id: &str) -> WebhookEvent {
    event(json!({
        "event": "messages.upsert",
        "instance": instance,
        "data": {
            "key": { "remoteJid": jid, "fromMe": false, "id": message_id },
            "pushName": "Maria",
            "message": { "conversation": text }
        }
    }))
}

fn event(value: Value) -> WebhookEvent {
    serde_json::from_value(value).unwrap()
}

async fn book(fx: &Fixture, customer_id: Uuid, staff_id: Option<Uuid>, start_time: DateTime<Utc>) -> Result<Appointment, AppointmentError> {
    fx.booking.book_appointment(BookingCommand {
        organization_id: fx.organization_id,
        customer_id,
        service_id: fx.service.id,
        staff_id,
        start_time,
        notes: None,
    }).await
}

fn settings() -> WebhookSettings {
    WebhookSettings {
        working_hours: vec![9, 10, 11, 14, 15, 16, 17],
        max_suggested_slots: 3,
        lookback: ChronoDuration::hours(24),
    }
}

async fn texts(fx: &Fixture) -> Vec<String> {
    fx.sender
        .sent()
        .await
        .into_iter()
        .filter_map(|notification| match notification.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::Poll { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn test_cancel_reply_frees_slot_and_offers_next_day_hours() {
    let fx = fixture().await;
    let staff_id = Some(Uuid::new_v4());

    let appointment = book(&fx, fx.customer.id, staff_id, at(10, 9, 0)).await.unwrap();
    assert_matches!(
        book(&fx, fx.customer.id, staff_id, at(10, 9, 15)).await,
        Err(AppointmentError::SlotUnavailable)
    );

    // Someone else already holds 09:00 tomorrow
    let other = fx.store.add_customer(fx.organization_id, "João", Some("11911112222")).await;
    book(&fx, other.id, None, at(11, 9, 0)).await.unwrap();

    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "Preciso cancelar"), now())
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Canceled {
        appointment_id: appointment.id,
        suggested_day: NaiveDate::from_ymd_opt(2024, 6, 11).unwrap(),
        suggested_hours: vec![10, 11, 14],
    });

    let stored = fx.store.appointment(appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Canceled);
    assert!(stored.canceled_at.is_some());

    assert!(wait_until(Duration::from_secs(2), || async {
        texts(&fx).await.iter().any(|text| text.contains("cancelado") && text.contains("10h, 11h, 14h"))
    }).await);

    // The freed slot can be booked again
    book(&fx, fx.customer.id, staff_id, at(10, 9, 15)).await.unwrap();
}

#[tokio::test]
async fn test_duplicate_confirmation_is_a_no_op() {
    let fx = fixture().await;
    let appointment = book(&fx, fx.customer.id, None, at(10, 14, 0)).await.unwrap();

    let first = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "Sim, confirmo"), now())
        .await
        .unwrap();
    let second = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "Sim, confirmo"), now())
        .await
        .unwrap();

    assert_eq!(first, WebhookOutcome::Confirmed { appointment_id: appointment.id, already_confirmed: false });
    assert_eq!(second, WebhookOutcome::Confirmed { appointment_id: appointment.id, already_confirmed: true });

    let stored = fx.store.appointment(appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Confirmed);
    assert!(stored.confirmed_at.is_some());

    let acknowledged = |texts: Vec<String>| texts.iter().filter(|text| text.contains("está confirmada")).count();
    assert!(wait_until(Duration::from_secs(2), || async { acknowledged(texts(&fx).await) >= 1 }).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(acknowledged(texts(&fx).await), 1);
}

#[tokio::test]
async fn test_poll_vote_confirms() {
    let fx = fixture().await;
    let appointment = book(&fx, fx.customer.id, None, at(10, 15, 0)).await.unwrap();

    let outcome = fx.webhook
        .handle_event_at(event(json!({
            "event": "messages.update",
            "instance": "clinica",
            "data": {
                "key": { "remoteJid": SENDER_JID, "fromMe": false },
                "message": {
                    "pollUpdates": [{ "vote": { "selectedOptions": [{ "name": "Sim" }] } }]
                }
            }
        })), now())
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Confirmed { appointment_id: appointment.id, already_confirmed: false });
}

#[tokio::test]
async fn test_acts_on_the_earliest_actionable_appointment() {
    let fx = fixture().await;
    let later = book(&fx, fx.customer.id, None, at(12, 10, 0)).await.unwrap();
    let sooner = book(&fx, fx.customer.id, None, at(11, 10, 0)).await.unwrap();

    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "ok"), now())
        .await
        .unwrap();

    assert_matches!(outcome, WebhookOutcome::Confirmed { appointment_id, .. } if appointment_id == sooner.id);
    assert_eq!(fx.store.appointment(later.id).await.unwrap().status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_lookback_window_includes_recent_past_only() {
    let fx = fixture().await;
    let stale = book(&fx, fx.customer.id, None, at(8, 9, 0)).await.unwrap();

    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "sim"), now())
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::ignored(IgnoreReason::NoActionableAppointment));
    assert_eq!(fx.store.appointment(stale.id).await.unwrap().status, AppointmentStatus::Scheduled);

    // Started two hours ago: still inside the 24h window
    let recent = book(&fx, fx.customer.id, None, at(10, 6, 0)).await.unwrap();
    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "sim"), now())
        .await
        .unwrap();
    assert_matches!(outcome, WebhookOutcome::Confirmed { appointment_id, .. } if appointment_id == recent.id);
}

#[tokio::test]
async fn test_terminal_appointments_are_not_actionable() {
    let fx = fixture().await;
    let appointment = book(&fx, fx.customer.id, None, at(10, 9, 0)).await.unwrap();
    fx.booking.change_status(appointment.id, AppointmentStatus::Completed).await.unwrap();

    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "cancelar"), now())
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::ignored(IgnoreReason::NoActionableAppointment));
    assert_eq!(fx.store.appointment(appointment.id).await.unwrap().status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn test_irrelevant_events_are_ignored() {
    let fx = fixture().await;
    book(&fx, fx.customer.id, None, at(10, 9, 0)).await.unwrap();

    let cases = [
        (text_event("clinica", SENDER_JID, "bom dia"), IgnoreReason::NoIntent),
        (text_event("desconhecida", SENDER_JID, "sim"), IgnoreReason::UnknownInstance),
        (text_event("clinica", "5521900001111@s.whatsapp.net", "sim"), IgnoreReason::UnknownSender),
        (text_event("clinica", "120363025@g.us", "sim"), IgnoreReason::GroupMessage),
        (event(json!({ "event": "connection.update", "instance": "clinica" })), IgnoreReason::UnsupportedEvent),
        (event(json!({
            "event": "messages.upsert",
            "instance": "clinica",
            "data": { "key": { "remoteJid": SENDER_JID }, "message": { "imageMessage": {} } }
        })), IgnoreReason::UnrecognizedContent),
    ];

    for (event, reason) in cases {
        let outcome = fx.webhook.handle_event_at(event, now()).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::ignored(reason));
    }

    let statuses: Vec<AppointmentStatus> = fx.store.appointments().await.iter().map(|apt| apt.status).collect();
    assert_eq!(statuses, vec![AppointmentStatus::Scheduled]);
}

#[tokio::test]
async fn test_sender_is_matched_within_the_instance_organization_only() {
    let fx = fixture().await;

    // Same phone, different organization, with its own appointment
    let other_org = Uuid::new_v4();
    let other_service = fx.store.add_service(other_org, "Consulta", 30).await;
    let other_customer = fx.store.add_customer(other_org, "Maria", Some("5511987654321")).await;
    let other = fx.booking.book_appointment(BookingCommand {
        organization_id: other_org,
        customer_id: other_customer.id,
        service_id: other_service.id,
        staff_id: None,
        start_time: at(10, 9, 0),
        notes: None,
    }).await.unwrap();

    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "cancelar"), now())
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::ignored(IgnoreReason::NoActionableAppointment));
    assert_eq!(fx.store.appointment(other.id).await.unwrap().status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_sender_without_country_code_still_matches() {
    let fx = fixture().await;
    let appointment = book(&fx, fx.customer.id, None, at(10, 9, 0)).await.unwrap();

    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", "11987654321@s.whatsapp.net", "confirmado"), now())
        .await
        .unwrap();

    assert_matches!(outcome, WebhookOutcome::Confirmed { appointment_id, .. } if appointment_id == appointment.id);
}

#[tokio::test]
async fn test_store_failure_surfaces_as_error() {
    let fx = fixture().await;
    book(&fx, fx.customer.id, None, at(10, 9, 0)).await.unwrap();
    fx.store.set_unavailable(true);

    let result = fx.webhook
        .handle_event_at(text_event("clinica", SENDER_JID, "sim"), now())
        .await;

    assert_matches!(result, Err(MessagingError::Appointment(AppointmentError::Store(_))));
}

#[tokio::test]
async fn test_redelivered_cancel_leaves_next_appointment_alone() {
    let fx = fixture().await;
    let first = book(&fx, fx.customer.id, None, at(10, 14, 0)).await.unwrap();
    let next_week = book(&fx, fx.customer.id, None, at(17, 14, 0)).await.unwrap();

    let delivery = || text_event_with_id("clinica", SENDER_JID, "cancelar", "3EB0C767D26A");

    let outcome = fx.webhook.handle_event_at(delivery(), now()).await.unwrap();
    assert_matches!(outcome, WebhookOutcome::Canceled { appointment_id, .. } if appointment_id == first.id);

    let redelivered = fx.webhook.handle_event_at(delivery(), now()).await.unwrap();
    assert_eq!(redelivered, WebhookOutcome::ignored(IgnoreReason::Duplicate));

    assert_eq!(fx.store.appointment(first.id).await.unwrap().status, AppointmentStatus::Canceled);
    assert_eq!(fx.store.appointment(next_week.id).await.unwrap().status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_delivery_that_failed_before_any_change_is_retried() {
    let fx = fixture().await;
    let appointment = book(&fx, fx.customer.id, None, at(10, 14, 0)).await.unwrap();
    let delivery = || text_event_with_id("clinica", SENDER_JID, "sim", "3EB0AA01");

    fx.store.set_unavailable(true);
    assert!(fx.webhook.handle_event_at(delivery(), now()).await.is_err());

    fx.store.set_unavailable(false);
    let outcome = fx.webhook.handle_event_at(delivery(), now()).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Confirmed { appointment_id: appointment.id, already_confirmed: false });
}

#[tokio::test]
async fn test_cancellation_is_announced_when_slot_lookup_fails() {
    let fx = fixture().await;
    let appointment = book(&fx, fx.customer.id, None, at(10, 14, 0)).await.unwrap();
    let next_week = book(&fx, fx.customer.id, None, at(17, 14, 0)).await.unwrap();
    fx.store.set_listing_unavailable(true);

    let delivery = || text_event_with_id("clinica", SENDER_JID, "cancelar", "3EB0BB02");

    let result = fx.webhook.handle_event_at(delivery(), now()).await;
    assert_matches!(result, Err(MessagingError::Appointment(AppointmentError::Store(_))));
    assert_eq!(fx.store.appointment(appointment.id).await.unwrap().status, AppointmentStatus::Canceled);

    assert!(wait_until(Duration::from_secs(2), || async {
        texts(&fx).await.iter().any(|text| text.contains("cancelado"))
    }).await);
    assert!(texts(&fx).await.iter().all(|text| !text.contains("Horários livres")));

    // The provider retries after the 500; the cancellation already happened
    let retried = fx.webhook.handle_event_at(delivery(), now()).await.unwrap();
    assert_eq!(retried, WebhookOutcome::ignored(IgnoreReason::Duplicate));
    assert_eq!(fx.store.appointment(next_week.id).await.unwrap().status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_stricter_phone_policy_rejects_other_area_codes() {
    let fx = fixture().await;
    let appointment = book(&fx, fx.customer.id, None, at(10, 14, 0)).await.unwrap();
    let other_area = "5521987654321@s.whatsapp.net";

    let offset = FixedOffset::east_opt(0).unwrap();
    let strict = WebhookDispatcher::new(
        fx.booking.clone(),
        Arc::new(SlotRecommendationService::new(fx.store.clone(), offset)),
        IntentClassifier::default(),
        settings(),
    )
    .with_phone_policy(PhoneMatchPolicy { suffix_len: 11 });

    let outcome = strict
        .handle_event_at(text_event("clinica", other_area, "sim"), now())
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::ignored(IgnoreReason::UnknownSender));

    // The default eight-digit window accepts the same sender
    let outcome = fx.webhook
        .handle_event_at(text_event("clinica", other_area, "sim"), now())
        .await
        .unwrap();
    assert_matches!(outcome, WebhookOutcome::Confirmed { appointment_id, .. } if appointment_id == appointment.id);
}
