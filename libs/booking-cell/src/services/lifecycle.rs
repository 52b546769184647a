// libs/booking-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentPatch, AppointmentStatus, BookingError, CancelledBy,
};
use crate::notifications::{build_event, AppointmentEventType, NotificationDispatcher};
use crate::repository::AppointmentRepository;
use crate::services::{dispatch_event, ACTIVE_STATUSES};

/// Transitions of an existing appointment: confirmation, counter-proposal,
/// cancellation. Every method checks ownership before touching state and
/// leaves the stored record untouched on an illegal transition.
pub struct AppointmentLifecycleService {
    repo: Arc<dyn AppointmentRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AppointmentLifecycleService {
    pub fn new(
        repo: Arc<dyn AppointmentRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self { repo, dispatcher }
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        caller_id: Uuid,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.repo.get_by_id(appointment_id).await?;
        Self::check_party(&appointment, caller_id)?;
        Ok(appointment)
    }

    /// Practitioner accepts a pending booking (or re-confirms after their own
    /// counter-proposal lapsed into confirmation some other way).
    pub async fn confirm(
        &self,
        appointment_id: Uuid,
        practitioner_id: Uuid,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.repo.get_by_id(appointment_id).await?;
        Self::check_practitioner(&appointment, practitioner_id)?;

        match appointment.status {
            AppointmentStatus::Pending | AppointmentStatus::PendingCounterProposal => {}
            ref other => {
                return Err(BookingError::InvalidStateTransition(format!(
                    "Impossible de confirmer un rendez-vous en statut {}",
                    other
                )))
            }
        }

        let updated = self
            .repo
            .update(
                appointment_id,
                AppointmentPatch {
                    status: Some(AppointmentStatus::Confirmed),
                    status_changed_at: Some(Utc::now()),
                    ..Default::default()
                },
                &appointment.status,
            )
            .await?;

        info!("Appointment {} confirmed by practitioner", updated.id);

        let event = build_event(
            AppointmentEventType::AppointmentConfirmed,
            &updated,
            updated.patient_id,
        );
        dispatch_event(self.dispatcher.as_ref(), event).await;

        Ok(updated)
    }

    /// Practitioner proposes a different start time. The appointment moves to
    /// awaiting-patient-response and carries the new schedule; the new slot is
    /// conflict-checked against the practitioner's other active appointments.
    pub async fn propose_new_time(
        &self,
        appointment_id: Uuid,
        practitioner_id: Uuid,
        new_start: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.repo.get_by_id(appointment_id).await?;
        Self::check_practitioner(&appointment, practitioner_id)?;

        if !appointment.status.is_active() {
            return Err(BookingError::InvalidStateTransition(format!(
                "Impossible de proposer un nouvel horaire pour un rendez-vous en statut {}",
                appointment.status
            )));
        }

        let duration = Duration::minutes(appointment.duration_minutes());
        let new_end = new_start + duration;

        let occupied = self
            .repo
            .list_for_practitioner_in_range(
                practitioner_id,
                new_start,
                new_end,
                ACTIVE_STATUSES,
                Some(appointment_id),
            )
            .await?;
        if !occupied.is_empty() {
            return Err(BookingError::Conflict(
                "Ce créneau est déjà réservé".to_string(),
            ));
        }

        let updated = self
            .repo
            .update(
                appointment_id,
                AppointmentPatch {
                    status: Some(AppointmentStatus::PendingCounterProposal),
                    scheduled_at: Some(new_start),
                    scheduled_end_at: Some(new_end),
                    status_changed_at: Some(Utc::now()),
                    ..Default::default()
                },
                &appointment.status,
            )
            .await?;

        info!(
            "Appointment {}: new time {} proposed to patient",
            updated.id, new_start
        );

        let event = build_event(
            AppointmentEventType::NewTimeProposed,
            &updated,
            updated.patient_id,
        );
        dispatch_event(self.dispatcher.as_ref(), event).await;

        Ok(updated)
    }

    /// Either party cancels an active appointment. The caller's role decides
    /// the terminal status; terminal appointments cannot be cancelled again.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        caller_id: Uuid,
        cancelled_by: CancelledBy,
        reason: Option<String>,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.repo.get_by_id(appointment_id).await?;
        match cancelled_by {
            CancelledBy::Patient => Self::check_patient(&appointment, caller_id)?,
            CancelledBy::Nutritionist => Self::check_practitioner(&appointment, caller_id)?,
        }

        if !appointment.status.is_active() {
            return Err(BookingError::InvalidStateTransition(format!(
                "Impossible d'annuler un rendez-vous en statut {}",
                appointment.status
            )));
        }

        let status = match cancelled_by {
            CancelledBy::Patient => AppointmentStatus::CancelledByPatient {
                reason: reason.clone(),
            },
            CancelledBy::Nutritionist => AppointmentStatus::CancelledByNutritionist {
                reason: reason.clone(),
            },
        };

        let now = Utc::now();
        let updated = self
            .repo
            .update(
                appointment_id,
                AppointmentPatch {
                    status: Some(status),
                    status_changed_at: Some(now),
                    cancelled_at: Some(now),
                    cancelled_by: Some(cancelled_by),
                    ..Default::default()
                },
                &appointment.status,
            )
            .await?;

        info!(
            "Appointment {} cancelled by {}",
            updated.id, cancelled_by
        );

        let recipient = match cancelled_by {
            CancelledBy::Patient => updated.practitioner_id,
            CancelledBy::Nutritionist => updated.patient_id,
        };
        let event = build_event(AppointmentEventType::AppointmentCancelled, &updated, recipient);
        dispatch_event(self.dispatcher.as_ref(), event).await;

        Ok(updated)
    }

    fn check_party(appointment: &Appointment, caller_id: Uuid) -> Result<(), BookingError> {
        if appointment.patient_id != caller_id && appointment.practitioner_id != caller_id {
            return Err(BookingError::Forbidden(
                "Vous n'êtes pas partie prenante de ce rendez-vous".to_string(),
            ));
        }
        Ok(())
    }

    fn check_practitioner(
        appointment: &Appointment,
        practitioner_id: Uuid,
    ) -> Result<(), BookingError> {
        if appointment.practitioner_id != practitioner_id {
            return Err(BookingError::Forbidden(
                "Ce rendez-vous appartient à un autre praticien".to_string(),
            ));
        }
        Ok(())
    }

    fn check_patient(appointment: &Appointment, patient_id: Uuid) -> Result<(), BookingError> {
        if appointment.patient_id != patient_id {
            return Err(BookingError::Forbidden(
                "Ce rendez-vous appartient à un autre patient".to_string(),
            ));
        }
        Ok(())
    }
}
