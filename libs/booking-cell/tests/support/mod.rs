// libs/booking-cell/tests/support/mod.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use availability_cell::models::{
    AvailabilityError, AvailabilityWindow, BookedInterval, ConsultationType,
    NewAvailabilityWindow,
};
use availability_cell::repository::{AvailabilityRepository, WindowFilter};
use booking_cell::models::{
    Appointment, AppointmentPatch, AppointmentStatus, BookingError, ConsultationMode,
    NewAppointment,
};
use booking_cell::notifications::{AppointmentEvent, NotificationDispatcher};
use booking_cell::repository::AppointmentRepository;

/// Mutex-backed store enforcing the `(practitioner_id, scheduled_at)`
/// uniqueness constraint for active rows, like the real storage does.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: Mutex<Vec<Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub async fn seed(&self, appointment: Appointment) {
        self.appointments.lock().await.push(appointment);
    }

    pub async fn stored(&self, id: Uuid) -> Appointment {
        self.appointments
            .lock()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .expect("appointment seeded")
    }

    pub async fn count(&self) -> usize {
        self.appointments.lock().await.len()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Appointment, BookingError> {
        self.appointments
            .lock()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
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
        Ok(self
            .appointments
            .lock()
            .await
            .iter()
            .filter(|a| a.practitioner_id == practitioner_id)
            .filter(|a| statuses.contains(&a.status.as_parts().0))
            .filter(|a| a.scheduled_at < end && a.scheduled_end_at > start)
            .filter(|a| Some(a.id) != exclude)
            .cloned()
            .collect())
    }

    async fn create(&self, appointment: NewAppointment) -> Result<Appointment, BookingError> {
        let mut appointments = self.appointments.lock().await;

        let occupied = appointments.iter().any(|a| {
            a.practitioner_id == appointment.practitioner_id
                && a.scheduled_at == appointment.scheduled_at
                && a.status.is_active()
        });
        if occupied {
            return Err(BookingError::Conflict(
                "Ce créneau est déjà réservé".to_string(),
            ));
        }

        let now = Utc::now();
        let created = Appointment {
            id: Uuid::new_v4(),
            patient_id: appointment.patient_id,
            practitioner_id: appointment.practitioner_id,
            scheduled_at: appointment.scheduled_at,
            scheduled_end_at: appointment.scheduled_end_at,
            status: AppointmentStatus::Pending,
            status_changed_at: now,
            cancelled_at: None,
            cancelled_by: None,
            mode: appointment.mode,
            consultation_type_id: appointment.consultation_type_id,
            created_at: now,
            updated_at: now,
        };
        appointments.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: AppointmentPatch,
        expected: &AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        let mut appointments = self.appointments.lock().await;
        let appointment = appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| BookingError::NotFound("Rendez-vous introuvable".to_string()))?;

        // Same compare-and-swap as the PostgREST filter: a stale expected
        // status means the caller lost a race.
        if appointment.status != *expected {
            return Err(BookingError::InvalidStateTransition(
                "Ce rendez-vous vient d'être modifié, veuillez réessayer".to_string(),
            ));
        }

        if let Some(status) = patch.status {
            appointment.status = status;
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            appointment.scheduled_at = scheduled_at;
        }
        if let Some(scheduled_end_at) = patch.scheduled_end_at {
            appointment.scheduled_end_at = scheduled_end_at;
        }
        if let Some(status_changed_at) = patch.status_changed_at {
            appointment.status_changed_at = status_changed_at;
        }
        if let Some(cancelled_at) = patch.cancelled_at {
            appointment.cancelled_at = Some(cancelled_at);
        }
        if let Some(cancelled_by) = patch.cancelled_by {
            appointment.cancelled_by = Some(cancelled_by);
        }
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }
}

// ==============================================================================
// DISPATCHERS
// ==============================================================================

#[derive(Default)]
pub struct RecordingDispatcher {
    pub events: Mutex<Vec<AppointmentEvent>>,
}

impl RecordingDispatcher {
    pub async fn recorded(&self) -> Vec<AppointmentEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, event: AppointmentEvent) -> anyhow::Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

pub struct FailingDispatcher;

#[async_trait]
impl NotificationDispatcher for FailingDispatcher {
    async fn notify(&self, _event: AppointmentEvent) -> anyhow::Result<()> {
        anyhow::bail!("notification channel unavailable")
    }
}

// ==============================================================================
// AVAILABILITY STUB
// ==============================================================================

/// Availability repository answering every consultation type lookup with a
/// fixed duration, for exercising duration resolution.
pub struct FixedDurationType(pub i32);

#[async_trait]
impl AvailabilityRepository for FixedDurationType {
    async fn list(
        &self,
        _practitioner_id: Uuid,
        _filter: &WindowFilter,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        Ok(Vec::new())
    }

    async fn create(
        &self,
        _window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        unreachable!("booking never creates windows")
    }

    async fn set_active(
        &self,
        _id: Uuid,
        _practitioner_id: Uuid,
        _active: bool,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        unreachable!("booking never edits windows")
    }

    async fn get_consultation_type(
        &self,
        id: Uuid,
    ) -> Result<Option<ConsultationType>, AvailabilityError> {
        Ok(Some(ConsultationType {
            id,
            code: "suivi".to_string(),
            default_duration_minutes: self.0,
        }))
    }

    async fn list_booked_intervals(
        &self,
        _practitioner_id: Uuid,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<BookedInterval>, AvailabilityError> {
        Ok(Vec::new())
    }
}

/// Availability repository that knows no consultation types, so the booking
/// service falls back to the default duration.
pub struct NoConsultationTypes;

#[async_trait]
impl AvailabilityRepository for NoConsultationTypes {
    async fn list(
        &self,
        _practitioner_id: Uuid,
        _filter: &WindowFilter,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        Ok(Vec::new())
    }

    async fn create(
        &self,
        _window: NewAvailabilityWindow,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        unreachable!("booking never creates windows")
    }

    async fn set_active(
        &self,
        _id: Uuid,
        _practitioner_id: Uuid,
        _active: bool,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        unreachable!("booking never edits windows")
    }

    async fn get_consultation_type(
        &self,
        _id: Uuid,
    ) -> Result<Option<ConsultationType>, AvailabilityError> {
        Ok(None)
    }

    async fn list_booked_intervals(
        &self,
        _practitioner_id: Uuid,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<BookedInterval>, AvailabilityError> {
        Ok(Vec::new())
    }
}

// ==============================================================================
// FIXTURES
// ==============================================================================

pub fn appointment_with_status(
    patient_id: Uuid,
    practitioner_id: Uuid,
    scheduled_at: DateTime<Utc>,
    status: AppointmentStatus,
) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        patient_id,
        practitioner_id,
        scheduled_at,
        scheduled_end_at: scheduled_at + Duration::minutes(30),
        status,
        status_changed_at: now,
        cancelled_at: None,
        cancelled_by: None,
        mode: ConsultationMode::Visio,
        consultation_type_id: None,
        created_at: now,
        updated_at: now,
    }
}
