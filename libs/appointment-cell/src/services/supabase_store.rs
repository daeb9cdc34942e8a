// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, ChannelBinding, Customer,
    MessageTemplateKind, NewAppointment, Service, StatusUpdate,
};
use crate::services::store::CalendarStore;

/// `CalendarStore` over the PostgREST API.
pub struct SupabaseCalendarStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseCalendarStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, AppointmentError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        parse_rows(rows)
    }

    async fn fetch_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AppointmentError> {
        Ok(self.fetch(path).await?.into_iter().next())
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<T>, AppointmentError> {
        let rows = self.supabase
            .request_returning(method, path, body)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        parse_rows(rows)
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, AppointmentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| AppointmentError::Store(format!("Failed to parse rows: {}", e)))
}

fn ts(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339()).into_owned()
}

#[async_trait]
impl CalendarStore for SupabaseCalendarStore {
    async fn get_service(
        &self,
        organization_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<Service>, AppointmentError> {
        let path = format!(
            "/rest/v1/services?id=eq.{}&organization_id=eq.{}",
            service_id, organization_id
        );
        self.fetch_one(&path).await
    }

    async fn get_customer(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppointmentError> {
        let path = format!(
            "/rest/v1/customers?id=eq.{}&organization_id=eq.{}",
            customer_id, organization_id
        );
        self.fetch_one(&path).await
    }

    async fn list_active_customers(&self, organization_id: Uuid) -> Result<Vec<Customer>, AppointmentError> {
        let path = format!(
            "/rest/v1/customers?organization_id=eq.{}&active=is.true&select=id,organization_id,name,phone,active",
            organization_id
        );
        self.fetch(&path).await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.fetch_one(&path).await
    }

    async fn find_overlapping(
        &self,
        organization_id: Uuid,
        staff_id: Option<Uuid>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("organization_id=eq.{}", organization_id),
            format!("start_time=lt.{}", ts(end)),
            format!("end_time=gt.{}", ts(start)),
            "status=neq.canceled".to_string(),
        ];

        if let Some(staff_id) = staff_id {
            query_parts.push(format!("staff_id=eq.{}", staff_id));
        }
        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("/rest/v1/appointments?{}&order=start_time.asc", query_parts.join("&"));
        debug!("Overlap query: {}", path);
        self.fetch(&path).await
    }

    async fn list_appointments(
        &self,
        organization_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        staff_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("organization_id=eq.{}", organization_id),
            format!("start_time=gte.{}", ts(from)),
            format!("start_time=lte.{}", ts(to)),
        ];

        if let Some(staff_id) = staff_id {
            query_parts.push(format!("staff_id=eq.{}", staff_id));
        }

        let path = format!("/rest/v1/appointments?{}&order=start_time.asc", query_parts.join("&"));
        self.fetch(&path).await
    }

    async fn find_next_appointment(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        since: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> Result<Option<Appointment>, AppointmentError> {
        let statuses = statuses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let path = format!(
            "/rest/v1/appointments?organization_id=eq.{}&customer_id=eq.{}&status=in.({})&start_time=gte.{}&order=start_time.asc&limit=1",
            organization_id, customer_id, statuses, ts(since)
        );
        self.fetch_one(&path).await
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let body = json!({
            "id": Uuid::new_v4(),
            "organization_id": appointment.organization_id,
            "customer_id": appointment.customer_id,
            "service_id": appointment.service_id,
            "staff_id": appointment.staff_id,
            "start_time": appointment.start_time.to_rfc3339(),
            "end_time": appointment.end_time.to_rfc3339(),
            "status": AppointmentStatus::Scheduled,
            "notes": appointment.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        self.write(Method::POST, "/rest/v1/appointments", Some(body))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Store("Insert returned no rows".to_string()))
    }

    async fn update_schedule(
        &self,
        appointment_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let body = json!({
            "start_time": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.write(Method::PATCH, &path, Some(body))
            .await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::AppointmentNotFound)
    }

    async fn update_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        update: StatusUpdate,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, expected
        );
        let body = serde_json::to_value(&update)
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        Ok(self.write(Method::PATCH, &path, Some(body)).await?.into_iter().next())
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let deleted: Vec<Value> = self.write(Method::DELETE, &path, None).await?;
        Ok(!deleted.is_empty())
    }

    async fn find_channel_by_instance(&self, instance_name: &str) -> Result<Option<ChannelBinding>, AppointmentError> {
        let path = format!(
            "/rest/v1/messaging_channels?instance_name=eq.{}",
            urlencoding::encode(instance_name)
        );
        self.fetch_one(&path).await
    }

    async fn get_channel(&self, organization_id: Uuid) -> Result<Option<ChannelBinding>, AppointmentError> {
        let path = format!("/rest/v1/messaging_channels?organization_id=eq.{}", organization_id);
        self.fetch_one(&path).await
    }

    async fn get_template_override(
        &self,
        organization_id: Uuid,
        kind: MessageTemplateKind,
    ) -> Result<Option<String>, AppointmentError> {
        let path = format!(
            "/rest/v1/message_templates?organization_id=eq.{}&kind=eq.{}&select=body",
            organization_id, kind
        );
        let rows: Vec<Value> = self.fetch(&path).await?;

        Ok(rows
            .into_iter()
            .find_map(|row| row.get("body").and_then(Value::as_str).map(str::to_string))
            .filter(|body| !body.trim().is_empty()))
    }
}
