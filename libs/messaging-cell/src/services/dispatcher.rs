// libs/messaging-cell/src/services/dispatcher.rs
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentStatus, Customer, MessageTemplateKind, TransitionOutcome,
};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::slots::SlotRecommendationService;
use appointment_cell::services::store::CalendarStore;
use shared_config::AppConfig;
use shared_utils::phone::PhoneMatchPolicy;

use crate::models::{IgnoreReason, InboundEvent, InboundMessage, Intent, MessagingError, WebhookEvent, WebhookOutcome};
use crate::services::deliveries::{DeliveryKey, RecentDeliveries};
use crate::services::intent::IntentClassifier;
use crate::services::normalizer::normalize_event;

/// One year; anything larger is treated as this.
const MAX_LOOKBACK_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub working_hours: Vec<u32>,
    pub max_suggested_slots: usize,
    /// How far back an appointment may have started and still be acted on.
    pub lookback: ChronoDuration,
}

impl From<&AppConfig> for WebhookSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            working_hours: config.working_hours.clone(),
            max_suggested_slots: config.max_suggested_slots,
            lookback: ChronoDuration::hours(config.confirmation_lookback_hours.clamp(0, MAX_LOOKBACK_HOURS)),
        }
    }
}

/// A failed event, and whether an appointment had already changed before
/// the failure.
struct Failure {
    error: MessagingError,
    applied: bool,
}

impl From<MessagingError> for Failure {
    fn from(error: MessagingError) -> Self {
        Self { error, applied: false }
    }
}

impl From<AppointmentError> for Failure {
    fn from(error: AppointmentError) -> Self {
        Self::from(MessagingError::from(error))
    }
}

/// Turns customer replies into appointment state changes.
///
/// Every event is independent. Anything that cannot be tied to an
/// organization, a customer and an actionable appointment comes back as
/// [`WebhookOutcome::Ignored`]; only store failures surface as errors.
///
/// Events carrying a provider message id are processed at most once per id.
/// A failure before any appointment changed releases the id so the
/// provider's retry runs again; once a status was written, redeliveries of
/// the same message are ignored.
pub struct WebhookDispatcher {
    booking: Arc<AppointmentBookingService>,
    slots: Arc<SlotRecommendationService>,
    store: Arc<dyn CalendarStore>,
    classifier: IntentClassifier,
    phone_policy: PhoneMatchPolicy,
    settings: WebhookSettings,
    deliveries: RecentDeliveries,
}

impl WebhookDispatcher {
    pub fn new(
        booking: Arc<AppointmentBookingService>,
        slots: Arc<SlotRecommendationService>,
        classifier: IntentClassifier,
        settings: WebhookSettings,
    ) -> Self {
        Self {
            store: booking.store(),
            booking,
            slots,
            classifier,
            phone_policy: PhoneMatchPolicy::default(),
            settings,
            deliveries: RecentDeliveries::default(),
        }
    }

    pub fn with_phone_policy(mut self, phone_policy: PhoneMatchPolicy) -> Self {
        self.phone_policy = phone_policy;
        self
    }

    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookOutcome, MessagingError> {
        self.handle_event_at(event, Utc::now()).await
    }

    /// Same as [`handle_event`](Self::handle_event) with an explicit clock.
    #[instrument(skip(self, event))]
    pub async fn handle_event_at(
        &self,
        event: WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, MessagingError> {
        let inbound = match normalize_event(event) {
            Ok(inbound) => inbound,
            Err(reason) => return Ok(ignore(reason)),
        };

        if inbound.message == InboundMessage::Unrecognized {
            return Ok(ignore(IgnoreReason::UnrecognizedContent));
        }

        let intent = self.classifier.classify_message(&inbound.message);
        if intent == Intent::Unknown {
            return Ok(ignore(IgnoreReason::NoIntent));
        }

        let delivery = inbound.message_id.clone().map(|message_id| DeliveryKey {
            instance: inbound.instance.clone(),
            message_id,
        });

        if let Some(key) = &delivery {
            if !self.deliveries.claim(key).await {
                return Ok(ignore(IgnoreReason::Duplicate));
            }
        }

        match self.apply(&inbound, intent, now).await {
            Ok(outcome) => Ok(outcome),
            Err(failure) => {
                if let Some(key) = delivery.as_ref().filter(|_| !failure.applied) {
                    self.deliveries.release(key).await;
                }
                Err(failure.error)
            }
        }
    }

    async fn apply(
        &self,
        inbound: &InboundEvent,
        intent: Intent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, Failure> {
        let Some(channel) = self.store.find_channel_by_instance(&inbound.instance).await? else {
            return Ok(ignore(IgnoreReason::UnknownInstance));
        };

        let Some(customer) = self.match_customer(channel.organization_id, inbound).await? else {
            return Ok(ignore(IgnoreReason::UnknownSender));
        };

        let since = now
            .checked_sub_signed(self.settings.lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let Some(appointment) = self.store
            .find_next_appointment(channel.organization_id, customer.id, since, &AppointmentStatus::ACTIONABLE)
            .await?
        else {
            return Ok(ignore(IgnoreReason::NoActionableAppointment));
        };

        info!("Customer {} replied {:?} for appointment {}", customer.id, intent, appointment.id);

        let result = match intent {
            Intent::Confirm => self.confirm(&appointment).await,
            Intent::Cancel => self.cancel(&appointment, now).await,
            Intent::Unknown => return Ok(ignore(IgnoreReason::NoIntent)),
        };

        match result {
            // Moved to a terminal status between the lookup and the write
            Err(Failure {
                error: MessagingError::Appointment(AppointmentError::InvalidTransition { from, to }),
                ..
            }) => {
                warn!("Appointment {} went {} before the {} reply could apply", appointment.id, from, to);
                Ok(ignore(IgnoreReason::NoActionableAppointment))
            }
            other => other,
        }
    }

    async fn confirm(&self, appointment: &Appointment) -> Result<WebhookOutcome, Failure> {
        let change = self.booking
            .transition_status(appointment.id, AppointmentStatus::Confirmed)
            .await?;

        let already_confirmed = change.outcome == TransitionOutcome::Unchanged;
        if already_confirmed {
            debug!("Appointment {} was already confirmed", appointment.id);
        } else {
            self.reply(MessageTemplateKind::ConfirmationReply, &change.appointment, None).await;
        }

        Ok(WebhookOutcome::Confirmed {
            appointment_id: appointment.id,
            already_confirmed,
        })
    }

    async fn cancel(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<WebhookOutcome, Failure> {
        let change = self.booking
            .transition_status(appointment.id, AppointmentStatus::Canceled)
            .await?;

        let local_today = now.with_timezone(&self.slots.local_offset()).date_naive();
        let suggested_day = local_today.succ_opt().unwrap_or(local_today);

        let suggested_hours = match self.slots
            .free_slots(
                appointment.organization_id,
                suggested_day,
                &self.settings.working_hours,
                self.settings.max_suggested_slots,
            )
            .await
        {
            Ok(hours) => hours,
            Err(e) => {
                // The cancellation stands, so the customer still hears about it
                warn!("Could not look up free slots after canceling {}: {}", appointment.id, e);
                self.reply(MessageTemplateKind::Cancellation, &change.appointment, None).await;
                return Err(Failure { error: e.into(), applied: true });
            }
        };

        let offer = offer_line(suggested_day, &suggested_hours);
        self.reply(MessageTemplateKind::Cancellation, &change.appointment, Some(&offer)).await;

        Ok(WebhookOutcome::Canceled {
            appointment_id: appointment.id,
            suggested_day,
            suggested_hours,
        })
    }

    /// Active customers of the organization whose phone matches the sender.
    /// Several matches are possible with the loose policy; the first wins.
    async fn match_customer(
        &self,
        organization_id: Uuid,
        inbound: &InboundEvent,
    ) -> Result<Option<Customer>, MessagingError> {
        if self.phone_policy.key(&inbound.sender_digits).is_none() {
            debug!("Sender number too short to match: {}", inbound.sender_digits);
            return Ok(None);
        }

        let mut matches: Vec<Customer> = self.store
            .list_active_customers(organization_id)
            .await?
            .into_iter()
            .filter(|customer| {
                customer.phone
                    .as_deref()
                    .is_some_and(|phone| self.phone_policy.matches(phone, &inbound.sender_digits))
            })
            .collect();

        if matches.len() > 1 {
            warn!("{} customers of {} match sender {}, using the first",
                  matches.len(), organization_id, inbound.sender_digits);
        }

        Ok(if matches.is_empty() { None } else { Some(matches.remove(0)) })
    }

    /// Best effort, same as the booking notifications.
    async fn reply(&self, kind: MessageTemplateKind, appointment: &Appointment, suffix: Option<&str>) {
        match self.booking.render_message(kind, appointment).await {
            Ok(Some(mut message)) => {
                if let Some(suffix) = suffix {
                    message.text = format!("{}\n\n{}", message.text, suffix);
                }
                self.booking.dispatch(message.into_notification());
            }
            Ok(None) => {}
            Err(e) => warn!("Could not prepare {} reply for appointment {}: {}", kind, appointment.id, e),
        }
    }
}

fn ignore(reason: IgnoreReason) -> WebhookOutcome {
    debug!("Ignoring webhook event: {}", reason);
    WebhookOutcome::ignored(reason)
}

pub fn offer_line(day: NaiveDate, hours: &[u32]) -> String {
    let day_label = day.format("%d/%m");

    if hours.is_empty() {
        return format!("Não há horários livres para amanhã ({}).", day_label);
    }

    let hours = hours
        .iter()
        .map(|hour| format!("{}h", hour))
        .collect::<Vec<_>>()
        .join(", ");

    format!("Horários livres para amanhã ({}): {}. Responda com o horário desejado para remarcar.", day_label, hours)
}
