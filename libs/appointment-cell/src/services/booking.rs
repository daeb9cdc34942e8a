// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus, BookingCommand,
    MessageTemplateKind, NewAppointment, SchedulingScope, StatusChange, TransitionOutcome,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SchedulingLocks;
use crate::services::notification::{MessageBody, NotificationDispatcher, OutboundNotification};
use crate::services::store::CalendarStore;
use crate::services::templates::{default_template, render, TemplateContext};

const MAX_STATUS_ATTEMPTS: usize = 3;

pub const REMINDER_POLL_OPTIONS: [&str; 2] = ["Sim", "Não"];

/// A template rendered for one customer, ready to hand to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub organization_id: Uuid,
    pub phone: String,
    pub text: String,
}

impl RenderedMessage {
    pub fn into_notification(self) -> OutboundNotification {
        OutboundNotification {
            organization_id: self.organization_id,
            phone: self.phone,
            body: MessageBody::Text(self.text),
        }
    }
}

pub struct AppointmentBookingService {
    store: Arc<dyn CalendarStore>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    locks: SchedulingLocks,
    notifications: NotificationDispatcher,
    local_offset: FixedOffset,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        notifications: NotificationDispatcher,
        local_offset: FixedOffset,
    ) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            locks: SchedulingLocks::new(),
            store,
            notifications,
            local_offset,
        }
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.local_offset
    }

    pub fn store(&self) -> Arc<dyn CalendarStore> {
        Arc::clone(&self.store)
    }

    /// Book a new appointment in `scheduled`.
    ///
    /// The conflict check and the insert run under the scope lock, so two
    /// concurrent requests for the same calendar cannot both succeed.
    #[instrument(skip(self, command), fields(organization_id = %command.organization_id))]
    pub async fn book_appointment(&self, command: BookingCommand) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for customer {} service {} staff {:?}",
              command.customer_id, command.service_id, command.staff_id);

        self.validate_booking_command(&command)?;

        let service = self.store
            .get_service(command.organization_id, command.service_id)
            .await?
            .filter(|service| service.active)
            .ok_or(AppointmentError::ServiceNotFound)?;

        self.store
            .get_customer(command.organization_id, command.customer_id)
            .await?
            .filter(|customer| customer.active)
            .ok_or(AppointmentError::CustomerNotFound)?;

        let end_time = end_for(command.start_time, service.duration_minutes)?;

        let scope = SchedulingScope {
            organization_id: command.organization_id,
            staff_id: command.staff_id,
        };

        let appointment = {
            let _guard = self.locks.acquire(scope).await;

            if self.conflict_service.has_conflict(
                command.organization_id,
                command.staff_id,
                command.start_time,
                end_time,
                None,
            ).await? {
                warn!("Slot {} - {} unavailable for staff {:?}", command.start_time, end_time, command.staff_id);
                return Err(AppointmentError::SlotUnavailable);
            }

            self.store.insert_appointment(NewAppointment {
                organization_id: command.organization_id,
                customer_id: command.customer_id,
                service_id: command.service_id,
                staff_id: command.staff_id,
                start_time: command.start_time,
                end_time,
                notes: command.notes,
            }).await?
        };

        info!("Appointment {} booked for {}", appointment.id, appointment.start_time);
        self.notify(MessageTemplateKind::Confirmation, &appointment).await;

        Ok(appointment)
    }

    /// Move an appointment to a new start time, keeping its service duration.
    #[instrument(skip(self))]
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        new_start_time: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rescheduling appointment {} to {}", appointment_id, new_start_time);

        let current = self.get_appointment(appointment_id).await?;
        if current.status.is_terminal() {
            warn!("Refusing to reschedule appointment {} in status {}", appointment_id, current.status);
            return Err(AppointmentError::NotReschedulable(current.status));
        }

        let service = self.store
            .get_service(current.organization_id, current.service_id)
            .await?
            .ok_or(AppointmentError::ServiceNotFound)?;

        let new_end_time = end_for(new_start_time, service.duration_minutes)?;

        let scope = SchedulingScope {
            organization_id: current.organization_id,
            staff_id: current.staff_id,
        };

        let updated = {
            let _guard = self.locks.acquire(scope).await;

            if self.conflict_service.has_conflict(
                current.organization_id,
                current.staff_id,
                new_start_time,
                new_end_time,
                Some(appointment_id),
            ).await? {
                warn!("Reschedule of {} rejected: slot {} - {} unavailable",
                      appointment_id, new_start_time, new_end_time);
                return Err(AppointmentError::SlotUnavailable);
            }

            self.store.update_schedule(appointment_id, new_start_time, new_end_time).await?
        };

        info!("Appointment {} rescheduled to {}", appointment_id, updated.start_time);
        self.notify(MessageTemplateKind::Reschedule, &updated).await;

        Ok(updated)
    }

    /// Status change requested by staff. Cancellation notifies the customer.
    pub async fn change_status(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
    ) -> Result<StatusChange, AppointmentError> {
        let change = self.transition_status(appointment_id, target).await?;

        if change.outcome == TransitionOutcome::Applied && target == AppointmentStatus::Canceled {
            self.notify(MessageTemplateKind::Cancellation, &change.appointment).await;
        }

        Ok(change)
    }

    /// Applies a validated transition without sending anything.
    ///
    /// The write is a compare-and-set on the status read just before; if
    /// another writer got there first the read and validation are repeated.
    #[instrument(skip(self))]
    pub async fn transition_status(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
    ) -> Result<StatusChange, AppointmentError> {
        for attempt in 1..=MAX_STATUS_ATTEMPTS {
            let current = self.get_appointment(appointment_id).await?;

            let outcome = self.lifecycle_service.validate_status_transition(current.status, target)?;
            if outcome == TransitionOutcome::Unchanged {
                return Ok(StatusChange { appointment: current, outcome });
            }

            let update = self.lifecycle_service.status_update(target, Utc::now());
            match self.store.update_status(appointment_id, current.status, update).await? {
                Some(appointment) => {
                    info!("Appointment {} moved {} -> {}", appointment_id, current.status, target);
                    return Ok(StatusChange { appointment, outcome });
                }
                None => {
                    warn!("Appointment {} changed status concurrently, retrying attempt {}/{}",
                          appointment_id, attempt, MAX_STATUS_ATTEMPTS);
                }
            }
        }

        Err(AppointmentError::Store(format!(
            "Status of appointment {} kept changing concurrently", appointment_id
        )))
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::AppointmentNotFound)
    }

    pub async fn list_appointments(
        &self,
        query: AppointmentListQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if query.to < query.from {
            return Err(AppointmentError::Validation("'to' must not be before 'from'".to_string()));
        }

        self.store
            .list_appointments(query.organization_id, query.from, query.to, query.staff_id)
            .await
    }

    /// Hard delete for entries created by mistake. No notification, no
    /// state machine.
    pub async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        if !self.store.delete_appointment(appointment_id).await? {
            return Err(AppointmentError::AppointmentNotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// Sends the reminder text as a Sim/Não poll so the vote comes back
    /// through the webhook.
    pub async fn send_reminder(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;
        if !appointment.status.is_actionable() {
            return Err(AppointmentError::Validation(format!(
                "Reminders are only sent for scheduled or confirmed appointments, not {}",
                appointment.status
            )));
        }

        let message = self
            .render_message(MessageTemplateKind::Reminder, &appointment)
            .await?
            .ok_or_else(|| AppointmentError::Validation("Customer has no phone number".to_string()))?;

        self.notifications.dispatch(OutboundNotification {
            organization_id: message.organization_id,
            phone: message.phone,
            body: MessageBody::Poll {
                question: message.text,
                options: REMINDER_POLL_OPTIONS.iter().map(|option| option.to_string()).collect(),
            },
        });

        info!("Reminder queued for appointment {}", appointment_id);
        Ok(())
    }

    /// Renders `kind` for the appointment's customer, honoring the
    /// organization's override. `None` when the customer has no phone.
    pub async fn render_message(
        &self,
        kind: MessageTemplateKind,
        appointment: &Appointment,
    ) -> Result<Option<RenderedMessage>, AppointmentError> {
        let Some(customer) = self.store
            .get_customer(appointment.organization_id, appointment.customer_id)
            .await?
        else {
            return Ok(None);
        };

        let Some(phone) = customer.phone.filter(|phone| !phone.trim().is_empty()) else {
            debug!("Customer {} has no phone, skipping {} message", customer.id, kind);
            return Ok(None);
        };

        let service_name = self.store
            .get_service(appointment.organization_id, appointment.service_id)
            .await?
            .map(|service| service.name)
            .unwrap_or_default();

        let template = self.store
            .get_template_override(appointment.organization_id, kind)
            .await?
            .unwrap_or_else(|| default_template(kind).to_string());

        let context = TemplateContext {
            name: customer.name,
            service: service_name,
            start_time: appointment.start_time,
            local_offset: self.local_offset,
        };

        Ok(Some(RenderedMessage {
            organization_id: appointment.organization_id,
            phone,
            text: render(&template, &context),
        }))
    }

    pub fn dispatch(&self, notification: OutboundNotification) {
        self.notifications.dispatch(notification);
    }

    /// Best effort. Failures are logged and never reach the caller.
    async fn notify(&self, kind: MessageTemplateKind, appointment: &Appointment) {
        match self.render_message(kind, appointment).await {
            Ok(Some(message)) => self.notifications.dispatch(message.into_notification()),
            Ok(None) => {}
            Err(e) => warn!("Could not prepare {} message for appointment {}: {}", kind, appointment.id, e),
        }
    }

    fn validate_booking_command(&self, command: &BookingCommand) -> Result<(), AppointmentError> {
        if command.organization_id.is_nil() {
            return Err(AppointmentError::Validation("organization_id is required".to_string()));
        }
        if command.customer_id.is_nil() {
            return Err(AppointmentError::Validation("customer_id is required".to_string()));
        }
        if command.service_id.is_nil() {
            return Err(AppointmentError::Validation("service_id is required".to_string()));
        }
        if command.staff_id.is_some_and(|staff_id| staff_id.is_nil()) {
            return Err(AppointmentError::Validation("staff_id must not be nil".to_string()));
        }
        Ok(())
    }
}

fn end_for(start: DateTime<Utc>, duration_minutes: i64) -> Result<DateTime<Utc>, AppointmentError> {
    if duration_minutes <= 0 {
        return Err(AppointmentError::Validation(format!(
            "Service duration must be positive, got {} minutes", duration_minutes
        )));
    }
    ChronoDuration::try_minutes(duration_minutes)
        .and_then(|duration| start.checked_add_signed(duration))
        .ok_or_else(|| AppointmentError::Validation(format!(
            "Service duration of {} minutes is out of range", duration_minutes
        )))
}
