// libs/appointment-cell/src/test_utils.rs
//
// Deterministic collaborators for engine-level tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ChannelBinding, Customer,
    MessageTemplateKind, NewAppointment, Service, StatusUpdate,
};
use crate::services::conflict::conflicts_with;
use crate::services::notification::{NotificationError, NotificationSender, OutboundNotification};
use crate::services::store::CalendarStore;

#[derive(Default)]
struct CalendarState {
    services: HashMap<Uuid, Service>,
    customers: HashMap<Uuid, Customer>,
    appointments: HashMap<Uuid, Appointment>,
    channels: Vec<ChannelBinding>,
    templates: HashMap<(Uuid, MessageTemplateKind), String>,
}

#[derive(Default)]
pub struct InMemoryCalendarStore {
    state: Mutex<CalendarState>,
    unavailable: AtomicBool,
    listing_unavailable: AtomicBool,
}

impl InMemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every store call fails with `AppointmentError::Store`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Like [`set_unavailable`](Self::set_unavailable) but only for
    /// `list_appointments`.
    pub fn set_listing_unavailable(&self, unavailable: bool) {
        self.listing_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn add_service(&self, organization_id: Uuid, name: &str, duration_minutes: i64) -> Service {
        let service = Service {
            id: Uuid::new_v4(),
            organization_id,
            name: name.to_string(),
            duration_minutes,
            price: 100.0,
            color: None,
            active: true,
        };
        self.state.lock().await.services.insert(service.id, service.clone());
        service
    }

    pub async fn put_service(&self, service: Service) {
        self.state.lock().await.services.insert(service.id, service);
    }

    pub async fn add_customer(&self, organization_id: Uuid, name: &str, phone: Option<&str>) -> Customer {
        let customer = Customer {
            id: Uuid::new_v4(),
            organization_id,
            name: name.to_string(),
            phone: phone.map(str::to_string),
            active: true,
        };
        self.state.lock().await.customers.insert(customer.id, customer.clone());
        customer
    }

    pub async fn add_channel(&self, organization_id: Uuid, instance_name: &str) -> ChannelBinding {
        let binding = ChannelBinding {
            organization_id,
            instance_name: instance_name.to_string(),
            api_key: None,
        };
        self.state.lock().await.channels.push(binding.clone());
        binding
    }

    pub async fn add_template(&self, organization_id: Uuid, kind: MessageTemplateKind, body: &str) {
        self.state.lock().await.templates.insert((organization_id, kind), body.to_string());
    }

    /// Inserts an appointment as-is, bypassing every check.
    pub async fn put_appointment(&self, appointment: Appointment) {
        self.state.lock().await.appointments.insert(appointment.id, appointment);
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Option<Appointment> {
        self.state.lock().await.appointments.get(&appointment_id).cloned()
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.state.lock().await.appointments.values().cloned().collect();
        all.sort_by_key(|apt| apt.start_time);
        all
    }

    fn check_available(&self) -> Result<(), AppointmentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppointmentError::Store("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn get_service(&self, organization_id: Uuid, service_id: Uuid) -> Result<Option<Service>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.services
            .get(&service_id)
            .filter(|service| service.organization_id == organization_id)
            .cloned())
    }

    async fn get_customer(&self, organization_id: Uuid, customer_id: Uuid) -> Result<Option<Customer>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.customers
            .get(&customer_id)
            .filter(|customer| customer.organization_id == organization_id)
            .cloned())
    }

    async fn list_active_customers(&self, organization_id: Uuid) -> Result<Vec<Customer>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.customers
            .values()
            .filter(|customer| customer.organization_id == organization_id && customer.active)
            .cloned()
            .collect())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.appointments.get(&appointment_id).cloned())
    }

    async fn find_overlapping(
        &self,
        organization_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.appointments
            .values()
            .filter(|apt| apt.organization_id == organization_id)
            .filter(|apt| staff_id.is_none() || apt.staff_id == staff_id)
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .filter(|apt| conflicts_with(apt, start, end))
            .cloned()
            .collect())
    }

    async fn list_appointments(
        &self,
        organization_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        staff_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.check_available()?;
        if self.listing_unavailable.load(Ordering::SeqCst) {
            return Err(AppointmentError::Store("appointment listing unavailable".to_string()));
        }
        let mut found: Vec<Appointment> = self.state.lock().await.appointments
            .values()
            .filter(|apt| apt.organization_id == organization_id)
            .filter(|apt| staff_id.is_none() || apt.staff_id == staff_id)
            .filter(|apt| apt.start_time >= from && apt.start_time <= to)
            .cloned()
            .collect();
        found.sort_by_key(|apt| apt.start_time);
        Ok(found)
    }

    async fn find_next_appointment(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        since: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> Result<Option<Appointment>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.appointments
            .values()
            .filter(|apt| apt.organization_id == organization_id && apt.customer_id == customer_id)
            .filter(|apt| statuses.contains(&apt.status) && apt.start_time >= since)
            .min_by_key(|apt| apt.start_time)
            .cloned())
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        self.check_available()?;
        let now = Utc::now();
        let created = Appointment {
            id: Uuid::new_v4(),
            organization_id: appointment.organization_id,
            customer_id: appointment.customer_id,
            service_id: appointment.service_id,
            staff_id: appointment.staff_id,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            status: AppointmentStatus::Scheduled,
            notes: appointment.notes,
            confirmed_at: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.appointments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_schedule(
        &self,
        appointment_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let appointment = state.appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::AppointmentNotFound)?;

        appointment.start_time = start;
        appointment.end_time = end;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
    ) -> Result<Option<Appointment>, AppointmentError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(appointment) = state.appointments
            .get_mut(&appointment_id)
            .filter(|apt| apt.status == expected)
        else {
            return Ok(None);
        };

        appointment.status = update.status;
        if update.confirmed_at.is_some() {
            appointment.confirmed_at = update.confirmed_at;
        }
        if update.canceled_at.is_some() {
            appointment.canceled_at = update.canceled_at;
        }
        appointment.updated_at = update.updated_at;
        Ok(Some(appointment.clone()))
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.appointments.remove(&appointment_id).is_some())
    }

    async fn find_channel_by_instance(&self, instance_name: &str) -> Result<Option<ChannelBinding>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.channels
            .iter()
            .find(|binding| binding.instance_name == instance_name)
            .cloned())
    }

    async fn get_channel(&self, organization_id: Uuid) -> Result<Option<ChannelBinding>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.channels
            .iter()
            .find(|binding| binding.organization_id == organization_id)
            .cloned())
    }

    async fn get_template_override(
        &self,
        organization_id: Uuid,
        kind: MessageTemplateKind,
    ) -> Result<Option<String>, AppointmentError> {
        self.check_available()?;
        Ok(self.state.lock().await.templates.get(&(organization_id, kind)).cloned())
    }
}

/// Captures every notification instead of sending it.
#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<OutboundNotification>>,
    failing: AtomicBool,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the attempt, then fails it with a provider error.
    pub fn failing() -> Self {
        let sender = Self::default();
        sender.failing.store(true, Ordering::SeqCst);
        sender
    }

    pub async fn sent(&self) -> Vec<OutboundNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, notification: &OutboundNotification) -> Result<(), NotificationError> {
        self.sent.lock().await.push(notification.clone());

        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Provider {
                status: 503,
                message: "provider down".to_string(),
            });
        }
        Ok(())
    }
}
