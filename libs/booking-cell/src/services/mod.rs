// libs/booking-cell/src/services/mod.rs
pub mod booking;
pub mod lifecycle;
pub mod negotiation;

use tracing::warn;

use crate::notifications::{AppointmentEvent, NotificationDispatcher};

/// Best effort: a failed dispatch never rolls the transition back.
pub(crate) async fn dispatch_event(
    dispatcher: &dyn NotificationDispatcher,
    event: AppointmentEvent,
) {
    let event_type = event.event_type;
    let appointment_id = event.appointment_id;
    if let Err(e) = dispatcher.notify(event).await {
        warn!(
            "Failed to dispatch {:?} notification for appointment {}: {}",
            event_type, appointment_id, e
        );
    }
}

/// Status column values that occupy a practitioner's timeslot.
pub(crate) const ACTIVE_STATUSES: &[&str] = &["pending", "confirmed"];
