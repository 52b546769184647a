// libs/booking-cell/src/services/booking.rs
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::SchedulingDefaults;
use availability_cell::repository::AvailabilityRepository;

use crate::models::{Appointment, BookAppointmentRequest, BookingError, NewAppointment};
use crate::notifications::{build_event, AppointmentEventType, NotificationDispatcher};
use crate::repository::AppointmentRepository;
use crate::services::{dispatch_event, ACTIVE_STATUSES};

/// Creates pending appointments. Conflicts are pre-checked for a friendly
/// error, then enforced again by the storage uniqueness constraint at write
/// time so two concurrent identical bookings cannot both succeed.
pub struct BookingService {
    repo: Arc<dyn AppointmentRepository>,
    availability: Arc<dyn AvailabilityRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    defaults: SchedulingDefaults,
}

impl BookingService {
    pub fn new(
        repo: Arc<dyn AppointmentRepository>,
        availability: Arc<dyn AvailabilityRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            repo,
            availability,
            dispatcher,
            defaults: SchedulingDefaults::default(),
        }
    }

    pub async fn create_booking(
        &self,
        request: BookAppointmentRequest,
        caller_id: Uuid,
    ) -> Result<Appointment, BookingError> {
        self.create_booking_at(request, caller_id, Utc::now()).await
    }

    /// `now` is injected so lead-time behaviour is deterministic under test.
    pub async fn create_booking_at(
        &self,
        request: BookAppointmentRequest,
        caller_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        if caller_id != request.patient_id {
            return Err(BookingError::Forbidden(
                "Vous ne pouvez réserver que pour vous-même".to_string(),
            ));
        }

        let lead_limit = now + Duration::minutes(self.defaults.lead_time_minutes);
        if request.scheduled_at < lead_limit {
            return Err(BookingError::Validation(format!(
                "Le rendez-vous doit être pris au moins {} heures à l'avance",
                self.defaults.lead_time_minutes / 60
            )));
        }

        let duration_minutes = self.resolve_duration(request.consultation_type_id).await?;
        let scheduled_end_at = request.scheduled_at + Duration::minutes(duration_minutes as i64);

        let occupied = self
            .repo
            .list_for_practitioner_in_range(
                request.practitioner_id,
                request.scheduled_at,
                scheduled_end_at,
                ACTIVE_STATUSES,
                None,
            )
            .await?;
        if !occupied.is_empty() {
            return Err(BookingError::Conflict(
                "Ce créneau est déjà réservé".to_string(),
            ));
        }

        // Storage uniqueness still applies here: a concurrent booking that
        // slipped past the pre-check surfaces as Conflict from `create`.
        let appointment = self
            .repo
            .create(NewAppointment {
                patient_id: request.patient_id,
                practitioner_id: request.practitioner_id,
                scheduled_at: request.scheduled_at,
                scheduled_end_at,
                mode: request.mode,
                consultation_type_id: request.consultation_type_id,
            })
            .await?;

        info!(
            "Appointment {} booked: patient {} with practitioner {} at {}",
            appointment.id,
            appointment.patient_id,
            appointment.practitioner_id,
            appointment.scheduled_at
        );

        let event = build_event(
            AppointmentEventType::BookingRequested,
            &appointment,
            appointment.practitioner_id,
        );
        dispatch_event(self.dispatcher.as_ref(), event).await;

        Ok(appointment)
    }

    async fn resolve_duration(&self, type_id: Option<Uuid>) -> Result<i32, BookingError> {
        let Some(type_id) = type_id else {
            return Ok(self.defaults.default_duration_minutes);
        };

        match self
            .availability
            .get_consultation_type(type_id)
            .await
            .map_err(|e| BookingError::Database(e.to_string()))?
        {
            Some(ct) if ct.default_duration_minutes > 0 => Ok(ct.default_duration_minutes),
            Some(ct) => {
                // A non-positive duration would invert the appointment
                // interval and defeat the overlap pre-check.
                warn!(
                    "Consultation type {} has invalid duration {}, using default",
                    ct.id, ct.default_duration_minutes
                );
                Ok(self.defaults.default_duration_minutes)
            }
            None => {
                debug!(
                    "Consultation type {} not found, using default duration",
                    type_id
                );
                Ok(self.defaults.default_duration_minutes)
            }
        }
    }
}
