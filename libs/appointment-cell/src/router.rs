// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::{self, SchedulingState};

pub fn appointment_routes(state: Arc<SchedulingState>) -> Router {
    Router::new()
        // Calendar
        .route("/appointments", post(handlers::book_appointment).get(handlers::list_appointments))
        .route(
            "/appointments/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/appointments/{appointment_id}/status", patch(handlers::change_status))
        .route("/appointments/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/appointments/{appointment_id}/remind", post(handlers::send_reminder))

        // Availability
        .route("/organizations/{organization_id}/free-slots", get(handlers::free_slots))
        .with_state(state)
}
