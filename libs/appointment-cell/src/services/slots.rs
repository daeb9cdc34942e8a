// libs/appointment-cell/src/services/slots.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::store::CalendarStore;

pub struct SlotRecommendationService {
    store: Arc<dyn CalendarStore>,
    local_offset: FixedOffset,
}

impl SlotRecommendationService {
    pub fn new(store: Arc<dyn CalendarStore>, local_offset: FixedOffset) -> Self {
        Self { store, local_offset }
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.local_offset
    }

    /// Working hours of `day` (clinic local date) with no live appointment
    /// starting in them, ascending, at most `max_results`.
    #[instrument(skip(self, working_hours))]
    pub async fn free_slots(
        &self,
        organization_id: Uuid,
        day: NaiveDate,
        working_hours: &[u32],
        max_results: usize,
    ) -> Result<Vec<u32>, AppointmentError> {
        let (from, to) = day_bounds(day, self.local_offset)?;

        let appointments = self.store
            .list_appointments(organization_id, from, to, None)
            .await?;

        let free = free_hours(&appointments, working_hours, max_results, self.local_offset);
        debug!("Free hours for {} on {}: {:?}", organization_id, day, free);

        Ok(free)
    }
}

/// `[00:00:00, 23:59:59]` of a local date, in UTC.
pub fn day_bounds(
    day: NaiveDate,
    local_offset: FixedOffset,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppointmentError> {
    let to_utc = |h, m, s| {
        day.and_hms_opt(h, m, s)
            .and_then(|naive| naive.and_local_timezone(local_offset).single())
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| AppointmentError::Validation(format!("Invalid day {}", day)))
    };

    Ok((to_utc(0, 0, 0)?, to_utc(23, 59, 59)?))
}

/// Hour-granularity bucketing: any non-canceled appointment occupies the
/// whole local hour it starts in.
pub fn free_hours(
    appointments: &[Appointment],
    working_hours: &[u32],
    max_results: usize,
    local_offset: FixedOffset,
) -> Vec<u32> {
    let occupied: BTreeSet<u32> = appointments
        .iter()
        .filter(|apt| apt.status != AppointmentStatus::Canceled)
        .map(|apt| apt.start_time.with_timezone(&local_offset).hour())
        .collect();

    let mut hours: Vec<u32> = working_hours.to_vec();
    hours.sort_unstable();
    hours.dedup();

    hours
        .into_iter()
        .filter(|hour| !occupied.contains(hour))
        .take(max_results)
        .collect()
}
