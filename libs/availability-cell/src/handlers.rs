// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AvailabilityError, CreateWindowRequest, WindowType};
use crate::repository::SupabaseAvailabilityRepository;
use crate::services::slots::SlotGenerator;
use crate::services::windows::AvailabilityWindowService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub consultation_type_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQueryParams {
    pub window_type: Option<WindowType>,
    pub include_inactive: Option<bool>,
}

fn map_availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::Validation(msg) => AppError::BadRequest(msg),
        AvailabilityError::Overlap => {
            AppError::Conflict("Ce créneau chevauche une disponibilité existante".to_string())
        }
        AvailabilityError::NotFound(msg) => AppError::NotFound(msg),
        AvailabilityError::Database(msg) => AppError::Database(msg),
    }
}

fn caller_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user identifier in token".to_string()))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_practitioner_slots(
    State(state): State<Arc<AppConfig>>,
    Path(practitioner_id): Path<Uuid>,
    Query(params): Query<SlotQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let repo = Arc::new(SupabaseAvailabilityRepository::new(&state, auth.token()));
    let generator = SlotGenerator::new(repo);

    match (params.date, params.start_date, params.end_date) {
        (Some(date), None, None) => {
            let response = generator
                .get_slots_for_date(practitioner_id, date, params.consultation_type_id)
                .await
                .map_err(map_availability_error)?;
            Ok(Json(json!(response)))
        }
        (None, Some(start), Some(end)) => {
            let response = generator
                .get_slots_for_range(practitioner_id, start, end, params.consultation_type_id)
                .await
                .map_err(map_availability_error)?;
            Ok(Json(json!(response)))
        }
        _ => Err(AppError::BadRequest(
            "Indiquez soit `date`, soit `start_date` et `end_date`".to_string(),
        )),
    }
}

// ==============================================================================
// WINDOW HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_practitioner_windows(
    State(state): State<Arc<AppConfig>>,
    Path(practitioner_id): Path<Uuid>,
    Query(params): Query<WindowQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let is_owner = user.id == practitioner_id.to_string();
    let include_inactive =
        params.include_inactive.unwrap_or(false) && (is_owner || user.is_admin());

    let repo = Arc::new(SupabaseAvailabilityRepository::new(&state, auth.token()));
    let service = AvailabilityWindowService::new(repo);

    let windows = service
        .list_windows(practitioner_id, params.window_type, include_inactive)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "windows": windows,
        "total": windows.len()
    })))
}

#[axum::debug_handler]
pub async fn create_window(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateWindowRequest>,
) -> Result<Json<Value>, AppError> {
    // Practitioners manage their own windows; admins may act for others.
    let practitioner_id = match (user.is_admin(), request.practitioner_id) {
        (true, Some(id)) => id,
        _ => {
            if !user.is_nutritionist() && !user.is_admin() {
                return Err(AppError::Forbidden(
                    "Seul un praticien peut gérer ses disponibilités".to_string(),
                ));
            }
            caller_uuid(&user)?
        }
    };

    let repo = Arc::new(SupabaseAvailabilityRepository::new(&state, auth.token()));
    let service = AvailabilityWindowService::new(repo);

    let window = service
        .create_window(practitioner_id, request)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "window": window
    })))
}

#[axum::debug_handler]
pub async fn deactivate_window(
    State(state): State<Arc<AppConfig>>,
    Path(window_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let practitioner_id = caller_uuid(&user)?;

    let repo = Arc::new(SupabaseAvailabilityRepository::new(&state, auth.token()));
    let service = AvailabilityWindowService::new(repo);

    let window = service
        .deactivate_window(window_id, practitioner_id)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "window": window
    })))
}
