// libs/booking-cell/src/repository.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentPatch, AppointmentRecord, AppointmentStatus, BookingError, NewAppointment};

/// Narrow persistence contract the booking services depend on.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Appointment, BookingError>;

    /// Appointments for a practitioner whose `[scheduled_at, scheduled_end_at)`
    /// intersects `[start, end)`, restricted to the given statuses.
    /// `exclude` drops one appointment from the result, used when re-checking
    /// conflicts for a rescheduled appointment against itself.
    async fn list_for_practitioner_in_range(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[&str],
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, BookingError>;

    /// Insert a new pending appointment. Storage enforces uniqueness on
    /// `(practitioner_id, scheduled_at)` for active rows; a violation
    /// surfaces as `BookingError::Conflict`.
    async fn create(&self, appointment: NewAppointment) -> Result<Appointment, BookingError>;

    /// Apply `patch` only if the row still carries `expected`, the status
    /// the caller's guard just read. A transition that raced and lost
    /// surfaces as `InvalidStateTransition`, never as a silent overwrite.
    async fn update(
        &self,
        id: Uuid,
        patch: AppointmentPatch,
        expected: &AppointmentStatus,
    ) -> Result<Appointment, BookingError>;
}

// ==============================================================================
// SUPABASE IMPLEMENTATION
// ==============================================================================

pub struct SupabaseAppointmentRepository {
    supabase: SupabaseClient,
    auth_token: String,
}

impl SupabaseAppointmentRepository {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.to_string(),
        }
    }

    fn map_err(e: SupabaseError) -> BookingError {
        match e {
            SupabaseError::NotFound(msg) => BookingError::NotFound(msg),
            SupabaseError::Conflict(_) => {
                BookingError::Conflict("Ce créneau est déjà réservé".to_string())
            }
            other => BookingError::Database(other.to_string()),
        }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, BookingError> {
        rows.into_iter()
            .map(|row| {
                let record: AppointmentRecord = serde_json::from_value(row).map_err(|e| {
                    BookingError::Database(format!("Failed to parse appointment: {}", e))
                })?;
                Appointment::from_record(record)
            })
            .collect()
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::NotFound("Rendez-vous introuvable".to_string()))
    }

    async fn list_for_practitioner_in_range(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[&str],
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, BookingError> {
        let mut path = format!(
            "/rest/v1/appointments?practitioner_id=eq.{}&scheduled_at=lt.{}&scheduled_end_at=gt.{}&status=in.({})&order=scheduled_at.asc",
            practitioner_id,
            urlencoding::encode(&end.to_rfc3339()),
            urlencoding::encode(&start.to_rfc3339()),
            statuses.join(","),
        );
        if let Some(exclude) = exclude {
            path.push_str(&format!("&id=neq.{}", exclude));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(rows)
    }

    async fn create(&self, appointment: NewAppointment) -> Result<Appointment, BookingError> {
        let now = Utc::now();
        let data = json!({
            "patient_id": appointment.patient_id,
            "practitioner_id": appointment.practitioner_id,
            "scheduled_at": appointment.scheduled_at.to_rfc3339(),
            "scheduled_end_at": appointment.scheduled_end_at.to_rfc3339(),
            "status": "pending",
            "status_reason": Value::Null,
            "status_changed_at": now.to_rfc3339(),
            "mode": appointment.mode.to_string(),
            "consultation_type_id": appointment.consultation_type_id,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(&self.auth_token),
                Some(data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::Database("Failed to create appointment".to_string()))
    }

    async fn update(
        &self,
        id: Uuid,
        patch: AppointmentPatch,
        expected: &AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        let mut data = serde_json::Map::new();

        if let Some(status) = &patch.status {
            let (status, reason) = status.as_parts();
            data.insert("status".to_string(), json!(status));
            data.insert("status_reason".to_string(), json!(reason));
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            data.insert("scheduled_at".to_string(), json!(scheduled_at.to_rfc3339()));
        }
        if let Some(scheduled_end_at) = patch.scheduled_end_at {
            data.insert(
                "scheduled_end_at".to_string(),
                json!(scheduled_end_at.to_rfc3339()),
            );
        }
        if let Some(status_changed_at) = patch.status_changed_at {
            data.insert(
                "status_changed_at".to_string(),
                json!(status_changed_at.to_rfc3339()),
            );
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            data.insert("cancelled_at".to_string(), json!(cancelled_at.to_rfc3339()));
        }
        if let Some(cancelled_by) = patch.cancelled_by {
            data.insert("cancelled_by".to_string(), json!(cancelled_by.to_string()));
        }
        data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        // Compare-and-swap on the column pair: the PATCH only matches while
        // the row still carries the status the guard read, so a lost race
        // yields zero rows instead of overwriting the winner's write.
        let (expected_status, expected_reason) = expected.as_parts();
        let mut path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            id, expected_status
        );
        match expected_reason {
            Some(reason) => path.push_str(&format!(
                "&status_reason=eq.{}",
                urlencoding::encode(reason)
            )),
            None => path.push_str("&status_reason=is.null"),
        }

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.auth_token),
                Some(Value::Object(data)),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(rows)?.into_iter().next().ok_or_else(|| {
            BookingError::InvalidStateTransition(
                "Ce rendez-vous vient d'être modifié, veuillez réessayer".to_string(),
            )
        })
    }
}
