// libs/availability-cell/src/services/windows.rs
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    AvailabilityError, AvailabilityWindow, CreateWindowRequest, NewAvailabilityWindow, WindowType,
};
use crate::repository::{AvailabilityRepository, WindowFilter};

pub struct AvailabilityWindowService {
    repo: Arc<dyn AvailabilityRepository>,
}

impl AvailabilityWindowService {
    pub fn new(repo: Arc<dyn AvailabilityRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_windows(
        &self,
        practitioner_id: Uuid,
        window_type: Option<WindowType>,
        include_inactive: bool,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!("Listing availability windows for practitioner {}", practitioner_id);

        let filter = WindowFilter {
            window_type,
            include_inactive,
        };
        self.repo.list(practitioner_id, &filter).await
    }

    /// Create a window after validating field coherence and, for recurring
    /// windows, the same-weekday non-overlap invariant.
    pub async fn create_window(
        &self,
        practitioner_id: Uuid,
        request: CreateWindowRequest,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        debug!(
            "Creating {} window for practitioner {}",
            request.window_type, practitioner_id
        );

        if request.start_time >= request.end_time {
            return Err(AvailabilityError::Validation(
                "L'heure de début doit précéder l'heure de fin".to_string(),
            ));
        }

        match request.window_type {
            WindowType::Recurring => {
                let day = request.day_of_week.ok_or_else(|| {
                    AvailabilityError::Validation(
                        "Une disponibilité récurrente requiert un jour de semaine".to_string(),
                    )
                })?;
                if !(0..=6).contains(&day) {
                    return Err(AvailabilityError::Validation(
                        "Le jour de semaine doit être compris entre 0 (dimanche) et 6 (samedi)"
                            .to_string(),
                    ));
                }

                self.check_recurring_overlap(practitioner_id, day, &request)
                    .await?;
            }
            WindowType::Exception | WindowType::Blocked => {
                if request.specific_date.is_none() {
                    return Err(AvailabilityError::Validation(
                        "Une exception ou un blocage requiert une date précise".to_string(),
                    ));
                }
            }
        }

        let window = NewAvailabilityWindow {
            practitioner_id,
            window_type: request.window_type,
            day_of_week: request.day_of_week,
            specific_date: request.specific_date,
            start_time: request.start_time,
            end_time: request.end_time,
            visio_available: request.visio_available.unwrap_or(true),
            cabinet_available: request.cabinet_available.unwrap_or(true),
            valid_from: request.valid_from,
            valid_until: request.valid_until,
        };

        self.repo.create(window).await
    }

    pub async fn deactivate_window(
        &self,
        id: Uuid,
        practitioner_id: Uuid,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        debug!("Deactivating window {} for practitioner {}", id, practitioner_id);
        self.repo.set_active(id, practitioner_id, false).await
    }

    async fn check_recurring_overlap(
        &self,
        practitioner_id: Uuid,
        day_of_week: i32,
        request: &CreateWindowRequest,
    ) -> Result<(), AvailabilityError> {
        let filter = WindowFilter {
            window_type: Some(WindowType::Recurring),
            include_inactive: false,
        };
        let existing = self.repo.list(practitioner_id, &filter).await?;

        for window in existing
            .iter()
            .filter(|w| w.day_of_week == Some(day_of_week))
        {
            if window.overlaps(request.start_time, request.end_time) {
                warn!(
                    "Recurring window overlap for practitioner {} on day {}: {}-{} vs existing {}-{}",
                    practitioner_id,
                    day_of_week,
                    request.start_time,
                    request.end_time,
                    window.start_time,
                    window.end_time
                );
                return Err(AvailabilityError::Overlap);
            }
        }

        Ok(())
    }
}
