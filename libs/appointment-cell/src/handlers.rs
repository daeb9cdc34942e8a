// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    parse_start_time, Appointment, AppointmentError, AppointmentListQuery, BookAppointmentRequest,
    BookingConfirmation, ChangeStatusRequest, FreeSlotsQuery, FreeSlotsResponse,
    RescheduleAppointmentRequest, StatusChange,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::slots::SlotRecommendationService;

/// Shared by every scheduling route.
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub booking: Arc<AppointmentBookingService>,
    pub slots: Arc<SlotRecommendationService>,
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::ServiceNotFound
            | AppointmentError::CustomerNotFound
            | AppointmentError::AppointmentNotFound => AppError::NotFound(error.to_string()),
            AppointmentError::SlotUnavailable => AppError::SlotUnavailable(error.to_string()),
            AppointmentError::InvalidTransition { .. }
            | AppointmentError::NotReschedulable(_) => AppError::InvalidTransition(error.to_string()),
            AppointmentError::Store(detail) => AppError::Database(detail),
        }
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

pub async fn book_appointment(
    State(state): State<Arc<SchedulingState>>,
    payload: Result<Json<BookAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingConfirmation>), AppError> {
    let request = json_body(payload)?;
    let command = request.into_command(state.booking.local_offset())?;

    let appointment = state.booking.book_appointment(command).await?;

    Ok((StatusCode::CREATED, Json(BookingConfirmation::from(&appointment))))
}

pub async fn list_appointments(
    State(state): State<Arc<SchedulingState>>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking.list_appointments(query).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

pub async fn get_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.booking.get_appointment(appointment_id).await?))
}

pub async fn change_status(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    payload: Result<Json<ChangeStatusRequest>, JsonRejection>,
) -> Result<Json<StatusChange>, AppError> {
    let request = json_body(payload)?;
    debug!("Status change for {} to {}", appointment_id, request.status);

    Ok(Json(state.booking.change_status(appointment_id, request.status).await?))
}

pub async fn reschedule_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    payload: Result<Json<RescheduleAppointmentRequest>, JsonRejection>,
) -> Result<Json<Appointment>, AppError> {
    let request = json_body(payload)?;
    let new_start_time = parse_start_time(&request.start_time, state.booking.local_offset())?;

    Ok(Json(state.booking.reschedule_appointment(appointment_id, new_start_time).await?))
}

pub async fn send_reminder(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.booking.send_reminder(appointment_id).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))))
}

pub async fn delete_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.booking.delete_appointment(appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

pub async fn free_slots(
    State(state): State<Arc<SchedulingState>>,
    Path(organization_id): Path<Uuid>,
    Query(query): Query<FreeSlotsQuery>,
) -> Result<Json<FreeSlotsResponse>, AppError> {
    let day = NaiveDate::parse_from_str(query.day.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::ValidationError(format!("day '{}' must be YYYY-MM-DD", query.day)))?;

    let max_results = query.max_results.unwrap_or(state.config.max_suggested_slots);

    let hours = state.slots
        .free_slots(organization_id, day, &state.config.working_hours, max_results)
        .await?;

    Ok(Json(FreeSlotsResponse {
        day: day.format("%Y-%m-%d").to_string(),
        hours,
    }))
}
