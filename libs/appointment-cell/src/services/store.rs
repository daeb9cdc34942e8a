// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ChannelBinding, Customer,
    MessageTemplateKind, NewAppointment, Service, StatusUpdate,
};

/// Persistent calendar of an organization: appointments plus the catalog
/// rows (services, customers, channel bindings, templates) the scheduling
/// engine reads. Every lookup that takes an `organization_id` must not return
/// rows of another organization.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn get_service(
        &self,
        organization_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<Service>, AppointmentError>;

    async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppointmentError>;

    async fn list_active_customers(&self, organization_id: Uuid) -> Result<Vec<Customer>, AppointmentError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Non-canceled appointments whose interval intersects `[start, end)`.
    /// `staff_id = None` searches the whole organization.
    async fn find_overlapping(
        &self,
        organization_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// All appointments (any status) starting within `[from, to]`, ordered by start.
    async fn list_appointments(
        &self,
        organization_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        staff_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Earliest appointment of the customer starting at or after `since`
    /// whose status is one of `statuses`.
    async fn find_next_appointment(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        since: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError>;

    async fn update_schedule(
        &self,
        appointment_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError>;

    /// Compare-and-set on status: applies `update` only while the stored
    /// status still equals `expected`. `Ok(None)` means it changed underneath.
    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Physical delete for erroneous entries. Returns false if nothing matched.
    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, AppointmentError>;

    async fn find_channel_by_instance(&self, instance_name: &str) -> Result<Option<ChannelBinding>, AppointmentError>;

    async fn get_channel(&self, organization_id: Uuid) -> Result<Option<ChannelBinding>, AppointmentError>;

    /// Organization-specific template text, if the organization overrides the default.
    async fn get_template_override(
        &self,
        organization_id: Uuid,
        kind: MessageTemplateKind,
    ) -> Result<Option<String>, AppointmentError>;
}
