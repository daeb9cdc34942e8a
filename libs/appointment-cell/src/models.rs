// libs/appointment-cell/src/models.rs
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    #[serde(default)]
    pub staff_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Half-open `[start, end)` overlap, ignoring status.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Arrived,
    Completed,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Canceled)
    }

    /// Statuses a customer can still confirm or cancel over the messaging channel.
    pub fn is_actionable(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub const ACTIONABLE: [AppointmentStatus; 2] =
        [AppointmentStatus::Scheduled, AppointmentStatus::Confirmed];
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Arrived => write!(f, "arrived"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Per-organization messaging provider instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelBinding {
    pub organization_id: Uuid,
    pub instance_name: String,
    /// Instance-level credential; falls back to the global provider key.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplateKind {
    Confirmation,
    Reminder,
    Cancellation,
    Reschedule,
    /// Acknowledgement sent when a customer confirms over the channel.
    ConfirmationReply,
}

impl fmt::Display for MessageTemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageTemplateKind::Confirmation => write!(f, "confirmation"),
            MessageTemplateKind::Reminder => write!(f, "reminder"),
            MessageTemplateKind::Cancellation => write!(f, "cancellation"),
            MessageTemplateKind::Reschedule => write!(f, "reschedule"),
            MessageTemplateKind::ConfirmationReply => write!(f, "confirmation_reply"),
        }
    }
}

fn default_true() -> bool {
    true
}

// ==============================================================================
// STORE WRITE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Which calendar a booking is checked and serialized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulingScope {
    pub organization_id: Uuid,
    pub staff_id: Option<Uuid>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub staff_id: Option<Uuid>,
    /// ISO-8601. Timestamps without an offset are read as clinic local time.
    pub start_time: String,
    pub notes: Option<String>,
}

impl BookAppointmentRequest {
    pub fn into_command(self, local_offset: FixedOffset) -> Result<BookingCommand, AppointmentError> {
        Ok(BookingCommand {
            organization_id: self.organization_id,
            customer_id: self.customer_id,
            service_id: self.service_id,
            staff_id: self.staff_id,
            start_time: parse_start_time(&self.start_time, local_offset)?,
            notes: self.notes,
        })
    }
}

/// A booking with its start time already resolved to UTC.
#[derive(Debug, Clone)]
pub struct BookingCommand {
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingConfirmation {
    pub appointment_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl From<&Appointment> for BookingConfirmation {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            status: appointment.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub start_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentListQuery {
    pub organization_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub staff_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreeSlotsQuery {
    /// YYYY-MM-DD in clinic local time
    pub day: String,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FreeSlotsResponse {
    pub day: String,
    pub hours: Vec<u32>,
}

/// Result of a status change request. `Unchanged` covers re-applying the
/// current status of a non-terminal appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub appointment: Appointment,
    pub outcome: TransitionOutcome,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service not found or inactive")]
    ServiceNotFound,

    #[error("Customer not found")]
    CustomerNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Requested slot is no longer available")]
    SlotUnavailable,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment cannot be rescheduled in status {0}")]
    NotReschedulable(AppointmentStatus),

    #[error("Store error: {0}")]
    Store(String),
}

/// Clinic-local offset from a whole-hour UTC offset; out-of-range values fall back to UTC.
pub fn local_offset(utc_offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_hours.saturating_mul(3600))
        .unwrap_or_else(|| {
            tracing::warn!("UTC offset {}h out of range, using UTC", utc_offset_hours);
            Utc.fix()
        })
}

/// Parses a booking start time. RFC 3339 timestamps keep their offset;
/// naive `YYYY-MM-DDTHH:MM[:SS]` values are read in `local_offset`.
pub fn parse_start_time(raw: &str, local_offset: FixedOffset) -> Result<DateTime<Utc>, AppointmentError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppointmentError::Validation("start_time is required".to_string()));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| naive.and_local_timezone(local_offset).single())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            AppointmentError::Validation(format!("start_time '{}' is not a valid ISO-8601 timestamp", raw))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parses_naive_start_time_in_local_offset() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let parsed = parse_start_time("2024-06-10T09:00", offset).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_keeps_explicit_offsets() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let parsed = parse_start_time("2024-06-10T09:00:00-03:00", offset).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_local_offset_handles_out_of_range_hours() {
        assert_eq!(local_offset(-3).local_minus_utc(), -3 * 3600);
        assert_eq!(local_offset(48).local_minus_utc(), 0);
    }

    #[test]
    fn test_rejects_garbage_start_time() {
        let offset = FixedOffset::east_opt(0).unwrap();
        assert!(matches!(
            parse_start_time("tomorrow morning", offset),
            Err(AppointmentError::Validation(_))
        ));
        assert!(matches!(parse_start_time("  ", offset), Err(AppointmentError::Validation(_))));
    }

    #[test]
    fn test_status_round_trips_through_serde_names() {
        let status: AppointmentStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status, AppointmentStatus::Canceled);
        assert_eq!(serde_json::to_string(&AppointmentStatus::Canceled).unwrap(), "\"canceled\"");
    }
}
