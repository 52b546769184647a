// libs/booking-cell/tests/lifecycle_test.rs
mod support;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use booking_cell::models::{AppointmentStatus, BookingError, CancelledBy};
use booking_cell::notifications::AppointmentEventType;
use booking_cell::repository::AppointmentRepository;
use booking_cell::services::lifecycle::AppointmentLifecycleService;

use support::{
    appointment_with_status, FailingDispatcher, InMemoryAppointmentRepository,
    RecordingDispatcher,
};

struct Harness {
    repo: Arc<InMemoryAppointmentRepository>,
    dispatcher: Arc<RecordingDispatcher>,
    service: AppointmentLifecycleService,
}

fn harness() -> Harness {
    let repo = Arc::new(InMemoryAppointmentRepository::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = AppointmentLifecycleService::new(repo.clone(), dispatcher.clone());
    Harness {
        repo,
        dispatcher,
        service,
    }
}

fn slot() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 3, 10, 0, 0).unwrap()
}

#[tokio::test]
async fn practitioner_confirms_a_pending_appointment() {
    let h = harness();
    let patient_id = Uuid::new_v4();
    let practitioner_id = Uuid::new_v4();
    let appointment =
        appointment_with_status(patient_id, practitioner_id, slot(), AppointmentStatus::Pending);
    h.repo.seed(appointment.clone()).await;

    let confirmed = h
        .service
        .confirm(appointment.id, practitioner_id)
        .await
        .unwrap();

    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert!(confirmed.status_changed_at > appointment.status_changed_at);

    let events = h.dispatcher.recorded().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, AppointmentEventType::AppointmentConfirmed);
    assert_eq!(events[0].recipient_id, patient_id);
}

#[tokio::test]
async fn confirming_clears_the_counter_proposal_reason() {
    let h = harness();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        Uuid::new_v4(),
        practitioner_id,
        slot(),
        AppointmentStatus::PendingCounterProposal,
    );
    h.repo.seed(appointment.clone()).await;

    let confirmed = h
        .service
        .confirm(appointment.id, practitioner_id)
        .await
        .unwrap();

    assert_eq!(confirmed.status.as_parts(), ("confirmed", None));
}

#[tokio::test]
async fn confirming_someone_elses_appointment_is_forbidden() {
    let h = harness();
    let appointment = appointment_with_status(
        Uuid::new_v4(),
        Uuid::new_v4(),
        slot(),
        AppointmentStatus::Pending,
    );
    h.repo.seed(appointment.clone()).await;

    let result = h.service.confirm(appointment.id, Uuid::new_v4()).await;

    assert_matches!(result, Err(BookingError::Forbidden(_)));
    assert_eq!(h.repo.stored(appointment.id).await.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn confirming_a_cancelled_appointment_is_illegal() {
    let h = harness();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        Uuid::new_v4(),
        practitioner_id,
        slot(),
        AppointmentStatus::CancelledByPatient { reason: None },
    );
    h.repo.seed(appointment.clone()).await;

    let result = h.service.confirm(appointment.id, practitioner_id).await;

    assert_matches!(result, Err(BookingError::InvalidStateTransition(_)));
    assert!(h.dispatcher.recorded().await.is_empty());
}

#[tokio::test]
async fn proposing_a_new_time_reschedules_and_awaits_the_patient() {
    let h = harness();
    let patient_id = Uuid::new_v4();
    let practitioner_id = Uuid::new_v4();
    let appointment =
        appointment_with_status(patient_id, practitioner_id, slot(), AppointmentStatus::Pending);
    h.repo.seed(appointment.clone()).await;

    let new_start = slot() + Duration::hours(3);
    let updated = h
        .service
        .propose_new_time(appointment.id, practitioner_id, new_start)
        .await
        .unwrap();

    assert_eq!(updated.status, AppointmentStatus::PendingCounterProposal);
    assert_eq!(updated.scheduled_at, new_start);
    assert_eq!(updated.scheduled_end_at, new_start + Duration::minutes(30));
    assert_eq!(updated.status.as_parts(), ("pending", Some("counter_proposal")));

    let events = h.dispatcher.recorded().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, AppointmentEventType::NewTimeProposed);
    assert_eq!(events[0].recipient_id, patient_id);
}

#[tokio::test]
async fn proposed_time_must_not_collide_with_another_appointment() {
    let h = harness();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        Uuid::new_v4(),
        practitioner_id,
        slot(),
        AppointmentStatus::Pending,
    );
    let other_start = slot() + Duration::hours(3);
    let other = appointment_with_status(
        Uuid::new_v4(),
        practitioner_id,
        other_start,
        AppointmentStatus::Confirmed,
    );
    h.repo.seed(appointment.clone()).await;
    h.repo.seed(other).await;

    let result = h
        .service
        .propose_new_time(appointment.id, practitioner_id, other_start)
        .await;

    assert_matches!(result, Err(BookingError::Conflict(_)));
    assert_eq!(h.repo.stored(appointment.id).await.scheduled_at, slot());
}

#[tokio::test]
async fn proposing_against_the_appointments_own_slot_is_allowed() {
    let h = harness();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        Uuid::new_v4(),
        practitioner_id,
        slot(),
        AppointmentStatus::Pending,
    );
    h.repo.seed(appointment.clone()).await;

    // Shifting by 15 minutes overlaps the current slot, which must not count.
    let result = h
        .service
        .propose_new_time(appointment.id, practitioner_id, slot() + Duration::minutes(15))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn patient_cancels_with_a_reason() {
    let h = harness();
    let patient_id = Uuid::new_v4();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        patient_id,
        practitioner_id,
        slot(),
        AppointmentStatus::Confirmed,
    );
    h.repo.seed(appointment.clone()).await;

    let cancelled = h
        .service
        .cancel(
            appointment.id,
            patient_id,
            CancelledBy::Patient,
            Some("empêchement".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(
        cancelled.status,
        AppointmentStatus::CancelledByPatient {
            reason: Some("empêchement".to_string())
        }
    );
    assert_eq!(cancelled.cancelled_by, Some(CancelledBy::Patient));
    assert!(cancelled.cancelled_at.is_some());

    let events = h.dispatcher.recorded().await;
    assert_eq!(events[0].event_type, AppointmentEventType::AppointmentCancelled);
    assert_eq!(events[0].recipient_id, practitioner_id);
}

#[tokio::test]
async fn practitioner_cancellation_notifies_the_patient() {
    let h = harness();
    let patient_id = Uuid::new_v4();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        patient_id,
        practitioner_id,
        slot(),
        AppointmentStatus::Pending,
    );
    h.repo.seed(appointment.clone()).await;

    let cancelled = h
        .service
        .cancel(appointment.id, practitioner_id, CancelledBy::Nutritionist, None)
        .await
        .unwrap();

    assert_eq!(
        cancelled.status,
        AppointmentStatus::CancelledByNutritionist { reason: None }
    );

    let events = h.dispatcher.recorded().await;
    assert_eq!(events[0].recipient_id, patient_id);
}

#[tokio::test]
async fn re_cancelling_leaves_the_record_untouched() {
    let h = harness();
    let patient_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        patient_id,
        Uuid::new_v4(),
        slot(),
        AppointmentStatus::CancelledByPatient { reason: None },
    );
    h.repo.seed(appointment.clone()).await;
    let before = h.repo.stored(appointment.id).await;

    let result = h
        .service
        .cancel(appointment.id, patient_id, CancelledBy::Patient, None)
        .await;

    assert_matches!(result, Err(BookingError::InvalidStateTransition(_)));

    let after = h.repo.stored(appointment.id).await;
    assert_eq!(after.status_changed_at, before.status_changed_at);
    assert_eq!(after.status, before.status);
    assert!(h.dispatcher.recorded().await.is_empty());
}

#[tokio::test]
async fn cancelling_a_completed_appointment_is_illegal() {
    let h = harness();
    let patient_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        patient_id,
        Uuid::new_v4(),
        slot(),
        AppointmentStatus::Completed,
    );
    h.repo.seed(appointment.clone()).await;

    let result = h
        .service
        .cancel(appointment.id, patient_id, CancelledBy::Patient, None)
        .await;

    assert_matches!(result, Err(BookingError::InvalidStateTransition(_)));
}

/// Delegates to the in-memory store but lingers after every read, so two
/// concurrent transitions both pass their status guard on stale data and
/// the conditional write has to arbitrate.
struct SlowReadRepository {
    inner: Arc<InMemoryAppointmentRepository>,
}

#[async_trait::async_trait]
impl AppointmentRepository for SlowReadRepository {
    async fn get_by_id(
        &self,
        id: Uuid,
    ) -> Result<booking_cell::models::Appointment, BookingError> {
        let appointment = self.inner.get_by_id(id).await?;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(appointment)
    }

    async fn list_for_practitioner_in_range(
        &self,
        practitioner_id: Uuid,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
        statuses: &[&str],
        exclude: Option<Uuid>,
    ) -> Result<Vec<booking_cell::models::Appointment>, BookingError> {
        self.inner
            .list_for_practitioner_in_range(practitioner_id, start, end, statuses, exclude)
            .await
    }

    async fn create(
        &self,
        appointment: booking_cell::models::NewAppointment,
    ) -> Result<booking_cell::models::Appointment, BookingError> {
        self.inner.create(appointment).await
    }

    async fn update(
        &self,
        id: Uuid,
        patch: booking_cell::models::AppointmentPatch,
        expected: &booking_cell::models::AppointmentStatus,
    ) -> Result<booking_cell::models::Appointment, BookingError> {
        self.inner.update(id, patch, expected).await
    }
}

#[tokio::test]
async fn exactly_one_of_two_concurrent_cancellations_succeeds() {
    let store = Arc::new(InMemoryAppointmentRepository::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = Arc::new(AppointmentLifecycleService::new(
        Arc::new(SlowReadRepository {
            inner: store.clone(),
        }),
        dispatcher.clone(),
    ));

    let patient_id = Uuid::new_v4();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        patient_id,
        practitioner_id,
        slot(),
        AppointmentStatus::Confirmed,
    );
    store.seed(appointment.clone()).await;

    let patient_cancel = tokio::spawn({
        let service = service.clone();
        let id = appointment.id;
        async move {
            service
                .cancel(id, patient_id, CancelledBy::Patient, Some("patient".to_string()))
                .await
        }
    });
    let practitioner_cancel = tokio::spawn({
        let service = service.clone();
        let id = appointment.id;
        async move {
            service
                .cancel(
                    id,
                    practitioner_id,
                    CancelledBy::Nutritionist,
                    Some("praticien".to_string()),
                )
                .await
        }
    });

    let first = patient_cancel.await.unwrap();
    let second = practitioner_cancel.await.unwrap();

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    let loser = [first, second].into_iter().find(|r| r.is_err()).unwrap();
    assert_matches!(loser, Err(BookingError::InvalidStateTransition(_)));

    // The stored record belongs to the winner; the loser wrote nothing.
    let stored = store.stored(appointment.id).await;
    let (column, reason) = stored.status.as_parts();
    match stored.cancelled_by {
        Some(CancelledBy::Patient) => {
            assert_eq!((column, reason), ("cancelled_by_patient", Some("patient")));
        }
        Some(CancelledBy::Nutritionist) => {
            assert_eq!(
                (column, reason),
                ("cancelled_by_nutritionist", Some("praticien"))
            );
        }
        None => panic!("no cancellation recorded"),
    }
    assert_eq!(dispatcher.recorded().await.len(), 1);
}

#[tokio::test]
async fn dispatch_failure_does_not_roll_the_transition_back() {
    let repo = Arc::new(InMemoryAppointmentRepository::default());
    let service = AppointmentLifecycleService::new(repo.clone(), Arc::new(FailingDispatcher));

    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        Uuid::new_v4(),
        practitioner_id,
        slot(),
        AppointmentStatus::Pending,
    );
    repo.seed(appointment.clone()).await;

    let confirmed = service.confirm(appointment.id, practitioner_id).await.unwrap();

    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_eq!(
        repo.stored(appointment.id).await.status,
        AppointmentStatus::Confirmed
    );
}

#[tokio::test]
async fn parties_can_read_their_appointment_but_strangers_cannot() {
    let h = harness();
    let patient_id = Uuid::new_v4();
    let practitioner_id = Uuid::new_v4();
    let appointment = appointment_with_status(
        patient_id,
        practitioner_id,
        slot(),
        AppointmentStatus::Pending,
    );
    h.repo.seed(appointment.clone()).await;

    assert!(h.service.get_appointment(appointment.id, patient_id).await.is_ok());
    assert!(h
        .service
        .get_appointment(appointment.id, practitioner_id)
        .await
        .is_ok());
    assert_matches!(
        h.service.get_appointment(appointment.id, Uuid::new_v4()).await,
        Err(BookingError::Forbidden(_))
    );
}
