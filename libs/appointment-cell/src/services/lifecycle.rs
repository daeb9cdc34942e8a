// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus, StatusUpdate, TransitionOutcome};

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    ///
    /// Re-applying the current status of a non-terminal appointment is
    /// accepted as `Unchanged` so duplicate deliveries stay harmless.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<TransitionOutcome, AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if current_status == new_status && !current_status.is_terminal() {
            debug!("Status already {}, nothing to apply", current_status);
            return Ok(TransitionOutcome::Unchanged);
        }

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(TransitionOutcome::Applied)
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Arrived,
                AppointmentStatus::Completed,
                AppointmentStatus::Canceled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Arrived,
                AppointmentStatus::Completed,
                AppointmentStatus::Canceled,
            ],
            AppointmentStatus::Arrived => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Canceled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Canceled => vec![],
        }
    }

    /// Store patch for moving into `target` at `now`.
    pub fn status_update(&self, target: AppointmentStatus, now: DateTime<Utc>) -> StatusUpdate {
        StatusUpdate {
            status: target,
            confirmed_at: (target == AppointmentStatus::Confirmed).then_some(now),
            canceled_at: (target == AppointmentStatus::Canceled).then_some(now),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use AppointmentStatus::*;

    const ALL: [AppointmentStatus; 5] = [Scheduled, Confirmed, Arrived, Completed, Canceled];

    #[test]
    fn test_happy_path_runs_to_completion() {
        let lifecycle = AppointmentLifecycleService::new();

        for (from, to) in [(Scheduled, Confirmed), (Confirmed, Arrived), (Arrived, Completed)] {
            assert_eq!(
                lifecycle.validate_status_transition(from, to),
                Ok(TransitionOutcome::Applied)
            );
        }
    }

    #[test]
    fn test_cancel_allowed_from_every_open_state() {
        let lifecycle = AppointmentLifecycleService::new();

        for from in [Scheduled, Confirmed, Arrived] {
            assert_eq!(
                lifecycle.validate_status_transition(from, Canceled),
                Ok(TransitionOutcome::Applied)
            );
        }
        assert_matches!(
            lifecycle.validate_status_transition(Completed, Canceled),
            Err(AppointmentError::InvalidTransition { from: Completed, to: Canceled })
        );
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let lifecycle = AppointmentLifecycleService::new();

        for from in [Completed, Canceled] {
            for to in ALL {
                assert_matches!(
                    lifecycle.validate_status_transition(from, to),
                    Err(AppointmentError::InvalidTransition { .. })
                );
            }
        }
    }

    #[test]
    fn test_no_backwards_moves() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle.validate_status_transition(Confirmed, Scheduled).is_err());
        assert!(lifecycle.validate_status_transition(Arrived, Confirmed).is_err());
        assert!(lifecycle.validate_status_transition(Arrived, Scheduled).is_err());
    }

    #[test]
    fn test_same_status_is_a_noop_while_open() {
        let lifecycle = AppointmentLifecycleService::new();

        for status in [Scheduled, Confirmed, Arrived] {
            assert_eq!(
                lifecycle.validate_status_transition(status, status),
                Ok(TransitionOutcome::Unchanged)
            );
        }
    }

    #[test]
    fn test_status_update_stamps_confirmation_and_cancellation() {
        let lifecycle = AppointmentLifecycleService::new();
        let now = Utc::now();

        let confirmed = lifecycle.status_update(Confirmed, now);
        assert_eq!(confirmed.confirmed_at, Some(now));
        assert_eq!(confirmed.canceled_at, None);

        let canceled = lifecycle.status_update(Canceled, now);
        assert_eq!(canceled.canceled_at, Some(now));
        assert_eq!(canceled.confirmed_at, None);

        let arrived = lifecycle.status_update(Arrived, now);
        assert_eq!(arrived.confirmed_at, None);
        assert_eq!(arrived.canceled_at, None);
    }
}
