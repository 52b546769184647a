// libs/booking-cell/src/notifications.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use availability_cell::models::{french_day_name, french_month_name};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::Appointment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentEventType {
    BookingRequested,
    AppointmentConfirmed,
    AppointmentCancelled,
    NewTimeProposed,
    ProposalAccepted,
    ProposalDeclined,
}

impl AppointmentEventType {
    fn as_str(&self) -> &'static str {
        match self {
            AppointmentEventType::BookingRequested => "booking_requested",
            AppointmentEventType::AppointmentConfirmed => "appointment_confirmed",
            AppointmentEventType::AppointmentCancelled => "appointment_cancelled",
            AppointmentEventType::NewTimeProposed => "new_time_proposed",
            AppointmentEventType::ProposalAccepted => "proposal_accepted",
            AppointmentEventType::ProposalDeclined => "proposal_declined",
        }
    }
}

/// Domain event emitted after a successful appointment transition.
/// `recipient_id` is the party who did NOT initiate the transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentEvent {
    pub event_type: AppointmentEventType,
    pub appointment_id: Uuid,
    pub recipient_id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub message: String,
}

/// Formats an instant as "mardi 3 mars 2026 à 14h30" for notification copy.
pub fn format_french_datetime(dt: &DateTime<Utc>) -> String {
    use chrono::{Datelike, Timelike};
    let date = dt.date_naive();
    format!(
        "{} {} {} {} à {}h{:02}",
        french_day_name(date.weekday()),
        date.day(),
        french_month_name(date.month()),
        date.year(),
        dt.hour(),
        dt.minute(),
    )
}

pub fn build_event(
    event_type: AppointmentEventType,
    appointment: &Appointment,
    recipient_id: Uuid,
) -> AppointmentEvent {
    let when = format_french_datetime(&appointment.scheduled_at);
    let message = match event_type {
        AppointmentEventType::BookingRequested => {
            format!("Nouvelle demande de rendez-vous le {}", when)
        }
        AppointmentEventType::AppointmentConfirmed => {
            format!("Votre rendez-vous du {} est confirmé", when)
        }
        AppointmentEventType::AppointmentCancelled => {
            format!("Le rendez-vous du {} a été annulé", when)
        }
        AppointmentEventType::NewTimeProposed => {
            format!("Un nouvel horaire vous est proposé : le {}", when)
        }
        AppointmentEventType::ProposalAccepted => {
            format!("Le nouvel horaire du {} a été accepté", when)
        }
        AppointmentEventType::ProposalDeclined => {
            format!("Le nouvel horaire du {} a été refusé", when)
        }
    };

    AppointmentEvent {
        event_type,
        appointment_id: appointment.id,
        recipient_id,
        patient_id: appointment.patient_id,
        practitioner_id: appointment.practitioner_id,
        scheduled_at: appointment.scheduled_at,
        message,
    }
}

/// Best-effort delivery. Callers log failures and never roll a transition
/// back because of one.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event: AppointmentEvent) -> anyhow::Result<()>;
}

// ==============================================================================
// SUPABASE IMPLEMENTATION
// ==============================================================================

pub struct SupabaseNotificationDispatcher {
    supabase: SupabaseClient,
    auth_token: String,
}

impl SupabaseNotificationDispatcher {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.to_string(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for SupabaseNotificationDispatcher {
    async fn notify(&self, event: AppointmentEvent) -> anyhow::Result<()> {
        let data = json!({
            "recipient_id": event.recipient_id,
            "event_type": event.event_type.as_str(),
            "appointment_id": event.appointment_id,
            "message": event.message,
            "is_read": false,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                Some(&self.auth_token),
                Some(data),
                Some(headers),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_french_datetime() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 3, 14, 30, 0).unwrap();
        assert_eq!(format_french_datetime(&dt), "mardi 3 mars 2026 à 14h30");
    }

    #[test]
    fn formats_midnight_minutes_with_padding() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 5, 9, 5, 0).unwrap();
        assert_eq!(format_french_datetime(&dt), "lundi 5 janvier 2026 à 9h05");
    }
}
