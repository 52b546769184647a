// libs/availability-cell/src/repository.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{
    AvailabilityError, AvailabilityWindow, BookedInterval, ConsultationType,
    NewAvailabilityWindow, WindowType,
};

#[derive(Debug, Clone, Default)]
pub struct WindowFilter {
    pub window_type: Option<WindowType>,
    pub include_inactive: bool,
}

/// Narrow persistence contract the availability services depend on.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// Windows ordered by day_of_week, then start_time.
    async fn list(
        &self,
        practitioner_id: Uuid,
        filter: &WindowFilter,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError>;

    async fn create(
        &self,
        window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, AvailabilityError>;

    async fn set_active(
        &self,
        id: Uuid,
        practitioner_id: Uuid,
        active: bool,
    ) -> Result<AvailabilityWindow, AvailabilityError>;

    async fn get_consultation_type(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsultationType>, AvailabilityError>;

    /// Pending/confirmed appointment intervals intersecting `[start, end)`.
    async fn list_booked_intervals(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BookedInterval>, AvailabilityError>;
}

// ==============================================================================
// SUPABASE IMPLEMENTATION
// ==============================================================================

pub struct SupabaseAvailabilityRepository {
    supabase: SupabaseClient,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct BookedIntervalRow {
    scheduled_at: DateTime<Utc>,
    scheduled_end_at: DateTime<Utc>,
}

impl SupabaseAvailabilityRepository {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.to_string(),
        }
    }

    fn map_err(e: SupabaseError) -> AvailabilityError {
        match e {
            SupabaseError::NotFound(msg) => AvailabilityError::NotFound(msg),
            other => AvailabilityError::Database(other.to_string()),
        }
    }

    fn parse_rows<T: serde::de::DeserializeOwned>(
        rows: Vec<Value>,
    ) -> Result<Vec<T>, AvailabilityError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| AvailabilityError::Database(format!("Failed to parse rows: {}", e)))
    }
}

#[async_trait]
impl AvailabilityRepository for SupabaseAvailabilityRepository {
    async fn list(
        &self,
        practitioner_id: Uuid,
        filter: &WindowFilter,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let mut path = format!(
            "/rest/v1/availability_windows?practitioner_id=eq.{}&order=day_of_week.asc,start_time.asc",
            practitioner_id
        );

        if let Some(window_type) = filter.window_type {
            path.push_str(&format!("&window_type=eq.{}", window_type));
        }
        if !filter.include_inactive {
            path.push_str("&is_active=eq.true");
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(Self::map_err)?;

        Self::parse_rows(rows)
    }

    async fn create(
        &self,
        window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        let now = Utc::now();
        let window_data = json!({
            "practitioner_id": window.practitioner_id,
            "window_type": window.window_type.to_string(),
            "day_of_week": window.day_of_week,
            "specific_date": window.specific_date,
            "start_time": window.start_time.format("%H:%M:%S").to_string(),
            "end_time": window.end_time.format("%H:%M:%S").to_string(),
            "visio_available": window.visio_available,
            "cabinet_available": window.cabinet_available,
            "valid_from": window.valid_from,
            "valid_until": window.valid_until,
            "is_active": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/availability_windows",
                Some(&self.auth_token),
                Some(window_data),
                Some(headers),
            )
            .await
            .map_err(Self::map_err)?;

        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::Database("Failed to create window".to_string()))?;

        serde_json::from_value(created)
            .map_err(|e| AvailabilityError::Database(format!("Failed to parse window: {}", e)))
    }

    async fn set_active(
        &self,
        id: Uuid,
        practitioner_id: Uuid,
        active: bool,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_windows?id=eq.{}&practitioner_id=eq.{}",
            id, practitioner_id
        );
        let patch = json!({
            "is_active": active,
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.auth_token),
                Some(patch),
                Some(headers),
            )
            .await
            .map_err(Self::map_err)?;

        let updated = rows
            .into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::NotFound("Disponibilité introuvable".to_string()))?;

        serde_json::from_value(updated)
            .map_err(|e| AvailabilityError::Database(format!("Failed to parse window: {}", e)))
    }

    async fn get_consultation_type(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsultationType>, AvailabilityError> {
        let path = format!("/rest/v1/consultation_types?id=eq.{}", id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(Self::map_err)?;

        let Some(row) = rows.into_iter().next() else {
            debug!("Consultation type {} not found, caller falls back to default", id);
            return Ok(None);
        };

        serde_json::from_value(row)
            .map(Some)
            .map_err(|e| AvailabilityError::Database(format!("Failed to parse type: {}", e)))
    }

    async fn list_booked_intervals(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BookedInterval>, AvailabilityError> {
        let path = format!(
            "/rest/v1/appointments?practitioner_id=eq.{}&scheduled_at=lt.{}&scheduled_end_at=gt.{}&status=in.(pending,confirmed)&select=scheduled_at,scheduled_end_at&order=scheduled_at.asc",
            practitioner_id,
            urlencoding::encode(&end.to_rfc3339()),
            urlencoding::encode(&start.to_rfc3339()),
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(Self::map_err)?;

        let rows: Vec<BookedIntervalRow> = Self::parse_rows(rows)?;
        Ok(rows
            .into_iter()
            .map(|r| BookedInterval {
                start: r.scheduled_at,
                end: r.scheduled_end_at,
            })
            .collect())
    }
}
