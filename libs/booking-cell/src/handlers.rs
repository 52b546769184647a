// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use availability_cell::repository::SupabaseAvailabilityRepository;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, BookAppointmentRequest, BookingError, CancelAppointmentRequest, CancelledBy,
    ProposeNewTimeRequest, RespondToProposalRequest,
};
use crate::notifications::SupabaseNotificationDispatcher;
use crate::repository::SupabaseAppointmentRepository;
use crate::services::booking::BookingService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::negotiation::NegotiationService;

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::Validation(msg) => AppError::BadRequest(msg),
        BookingError::NotFound(msg) => AppError::NotFound(msg),
        BookingError::Forbidden(msg) => AppError::Forbidden(msg),
        BookingError::Conflict(msg) => AppError::Conflict(msg),
        BookingError::InvalidStateTransition(msg) => AppError::Conflict(msg),
        BookingError::Database(msg) => AppError::Database(msg),
    }
}

fn caller_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user identifier in token".to_string()))
}

fn appointment_response(appointment: &Appointment) -> Json<Value> {
    Json(json!({
        "success": true,
        "appointment": appointment.to_record()
    }))
}

fn lifecycle_service(state: &AppConfig, token: &str) -> AppointmentLifecycleService {
    let repo = Arc::new(SupabaseAppointmentRepository::new(state, token));
    let dispatcher = Arc::new(SupabaseNotificationDispatcher::new(state, token));
    AppointmentLifecycleService::new(repo, dispatcher)
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller_id = caller_uuid(&user)?;

    let repo = Arc::new(SupabaseAppointmentRepository::new(&state, auth.token()));
    let availability = Arc::new(SupabaseAvailabilityRepository::new(&state, auth.token()));
    let dispatcher = Arc::new(SupabaseNotificationDispatcher::new(&state, auth.token()));
    let service = BookingService::new(repo, availability, dispatcher);

    let appointment = service
        .create_booking(request, caller_id)
        .await
        .map_err(map_booking_error)?;

    Ok(appointment_response(&appointment))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller_id = caller_uuid(&user)?;
    let service = lifecycle_service(&state, auth.token());

    let appointment = service
        .get_appointment(appointment_id, caller_id)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({ "appointment": appointment.to_record() })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_nutritionist() {
        return Err(AppError::Forbidden(
            "Seul le praticien peut confirmer un rendez-vous".to_string(),
        ));
    }
    let practitioner_id = caller_uuid(&user)?;
    let service = lifecycle_service(&state, auth.token());

    let appointment = service
        .confirm(appointment_id, practitioner_id)
        .await
        .map_err(map_booking_error)?;

    Ok(appointment_response(&appointment))
}

#[axum::debug_handler]
pub async fn propose_new_time(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ProposeNewTimeRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_nutritionist() {
        return Err(AppError::Forbidden(
            "Seul le praticien peut proposer un nouvel horaire".to_string(),
        ));
    }
    let practitioner_id = caller_uuid(&user)?;
    let service = lifecycle_service(&state, auth.token());

    let appointment = service
        .propose_new_time(appointment_id, practitioner_id, request.new_start)
        .await
        .map_err(map_booking_error)?;

    Ok(appointment_response(&appointment))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller_id = caller_uuid(&user)?;
    let cancelled_by = if user.is_nutritionist() {
        CancelledBy::Nutritionist
    } else {
        CancelledBy::Patient
    };
    let service = lifecycle_service(&state, auth.token());

    let appointment = service
        .cancel(appointment_id, caller_id, cancelled_by, request.reason)
        .await
        .map_err(map_booking_error)?;

    Ok(appointment_response(&appointment))
}

// ==============================================================================
// NEGOTIATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn respond_to_proposal(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RespondToProposalRequest>,
) -> Result<Json<Value>, AppError> {
    let patient_id = caller_uuid(&user)?;

    let repo = Arc::new(SupabaseAppointmentRepository::new(&state, auth.token()));
    let dispatcher = Arc::new(SupabaseNotificationDispatcher::new(&state, auth.token()));
    let service = NegotiationService::new(repo, dispatcher);

    let appointment = service
        .respond_to_counter_proposal(appointment_id, patient_id, &request.action, request.reason)
        .await
        .map_err(map_booking_error)?;

    Ok(appointment_response(&appointment))
}
