use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::store::CalendarStore;

pub struct ConflictDetectionService {
    store: Arc<dyn CalendarStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn CalendarStore>) -> Self {
        Self { store }
    }

    /// Whether `[start, end)` collides with a live appointment in scope.
    ///
    /// Scope is always the organization; with `staff_id` it narrows to that
    /// practitioner's calendar. `exclude_appointment_id` skips the appointment
    /// being edited. Errors only on store failure.
    pub async fn has_conflict(
        &self,
        organization_id: Uuid,
        staff_id: Option<Uuid>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let conflicting = self.find_conflicts(
            organization_id,
            staff_id,
            start_time,
            end_time,
            exclude_appointment_id,
        ).await?;

        Ok(!conflicting.is_empty())
    }

    pub async fn find_conflicts(
        &self,
        organization_id: Uuid,
        staff_id: Option<Uuid>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Checking conflicts for organization {} staff {:?} from {} to {}",
               organization_id, staff_id, start_time, end_time);

        if end_time <= start_time {
            return Err(AppointmentError::Validation(
                "end_time must be after start_time".to_string()
            ));
        }

        let candidates = self.store.find_overlapping(
            organization_id,
            staff_id,
            start_time,
            end_time,
            exclude_appointment_id,
        ).await?;

        // Re-check locally: the store query is only a pre-filter
        let conflicting: Vec<Appointment> = candidates
            .into_iter()
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .filter(|apt| apt.organization_id == organization_id)
            .filter(|apt| staff_id.is_none() || apt.staff_id == staff_id)
            .filter(|apt| conflicts_with(apt, start_time, end_time))
            .collect();

        if !conflicting.is_empty() {
            warn!("Conflict detected for organization {} staff {:?} - {} conflicting appointments",
                  organization_id, staff_id, conflicting.len());
        }

        Ok(conflicting)
    }
}

/// An appointment blocks `[start, end)` iff it is not canceled and the
/// half-open intervals intersect. Back-to-back slots do not conflict.
pub fn conflicts_with(appointment: &Appointment, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    appointment.status != AppointmentStatus::Canceled && appointment.overlaps(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn appointment(start: DateTime<Utc>, minutes: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            staff_id: None,
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            status,
            notes: None,
            confirmed_at: None,
            canceled_at: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_back_to_back_is_not_a_conflict() {
        let nine = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let existing = appointment(nine, 30, AppointmentStatus::Scheduled);

        let half_past = nine + Duration::minutes(30);
        assert!(!conflicts_with(&existing, half_past, half_past + Duration::minutes(30)));
        assert!(!conflicts_with(&existing, nine - Duration::minutes(30), nine));
    }

    #[test]
    fn test_one_minute_overlap_is_a_conflict() {
        let nine = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let existing = appointment(nine, 30, AppointmentStatus::Confirmed);

        let start = nine + Duration::minutes(29);
        assert!(conflicts_with(&existing, start, start + Duration::minutes(30)));
    }

    #[test]
    fn test_canceled_appointments_never_block() {
        let nine = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let existing = appointment(nine, 60, AppointmentStatus::Canceled);

        assert!(!conflicts_with(&existing, nine, nine + Duration::minutes(60)));
    }

    #[test]
    fn test_enclosing_interval_conflicts() {
        let nine = Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap();
        let existing = appointment(nine + Duration::minutes(15), 15, AppointmentStatus::Arrived);

        assert!(conflicts_with(&existing, nine, nine + Duration::hours(1)));
    }
}
