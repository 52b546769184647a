// libs/booking-cell/src/services/negotiation.rs
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentPatch, AppointmentStatus, BookingError, CancelledBy,
    DECLINE_DEFAULT_REASON,
};
use crate::notifications::{build_event, AppointmentEventType, NotificationDispatcher};
use crate::repository::AppointmentRepository;
use crate::services::dispatch_event;

/// Patient side of the counter-proposal exchange: the practitioner has moved
/// the appointment to `PendingCounterProposal` and the patient either accepts
/// the new time or declines, which cancels the appointment.
pub struct NegotiationService {
    repo: Arc<dyn AppointmentRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NegotiationService {
    pub fn new(
        repo: Arc<dyn AppointmentRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self { repo, dispatcher }
    }

    pub async fn respond_to_counter_proposal(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        action: &str,
        reason: Option<String>,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.repo.get_by_id(appointment_id).await?;

        if appointment.patient_id != patient_id {
            return Err(BookingError::Forbidden(
                "Ce rendez-vous appartient à un autre patient".to_string(),
            ));
        }
        if !appointment.status.is_awaiting_response() {
            return Err(BookingError::InvalidStateTransition(
                "Ce rendez-vous n'est pas en attente de réponse".to_string(),
            ));
        }

        match action {
            "accept" => self.accept(appointment_id, &appointment).await,
            "decline" => self.decline(appointment_id, &appointment, reason).await,
            _ => Err(BookingError::Validation("Action non reconnue".to_string())),
        }
    }

    async fn accept(
        &self,
        appointment_id: Uuid,
        appointment: &Appointment,
    ) -> Result<Appointment, BookingError> {
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

        info!(
            "Appointment {}: patient accepted the proposed time",
            updated.id
        );

        let event = build_event(
            AppointmentEventType::ProposalAccepted,
            &updated,
            appointment.practitioner_id,
        );
        dispatch_event(self.dispatcher.as_ref(), event).await;

        Ok(updated)
    }

    async fn decline(
        &self,
        appointment_id: Uuid,
        appointment: &Appointment,
        reason: Option<String>,
    ) -> Result<Appointment, BookingError> {
        let reason = reason.unwrap_or_else(|| DECLINE_DEFAULT_REASON.to_string());
        let now = Utc::now();

        let updated = self
            .repo
            .update(
                appointment_id,
                AppointmentPatch {
                    status: Some(AppointmentStatus::CancelledByPatient {
                        reason: Some(reason),
                    }),
                    status_changed_at: Some(now),
                    cancelled_at: Some(now),
                    cancelled_by: Some(CancelledBy::Patient),
                    ..Default::default()
                },
                &appointment.status,
            )
            .await?;

        info!(
            "Appointment {}: patient declined the proposed time",
            updated.id
        );

        let event = build_event(
            AppointmentEventType::ProposalDeclined,
            &updated,
            appointment.practitioner_id,
        );
        dispatch_event(self.dispatcher.as_ref(), event).await;

        Ok(updated)
    }
}
