// libs/availability-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    french_day_name, french_month_name, AvailabilityError, AvailabilityWindow, BookedInterval,
    DaySchedule, SchedulingDefaults, SingleDayResponse, SlotRangeResponse, TimeSlot, WindowType,
};
use crate::repository::{AvailabilityRepository, WindowFilter};

/// Derives bookable slots from availability windows, booked appointments and
/// the static fallback schedule. Pure read path; safe to run concurrently.
pub struct SlotGenerator {
    repo: Arc<dyn AvailabilityRepository>,
    defaults: SchedulingDefaults,
}

impl SlotGenerator {
    pub fn new(repo: Arc<dyn AvailabilityRepository>) -> Self {
        Self {
            repo,
            defaults: SchedulingDefaults::default(),
        }
    }

    pub fn with_defaults(repo: Arc<dyn AvailabilityRepository>, defaults: SchedulingDefaults) -> Self {
        Self { repo, defaults }
    }

    /// Slots for a date range. The range is silently clamped to the maximum
    /// number of days counted from `start`.
    pub async fn get_slots_for_range(
        &self,
        practitioner_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        consultation_type_id: Option<Uuid>,
    ) -> Result<SlotRangeResponse, AvailabilityError> {
        self.generate_range(practitioner_id, start, end, consultation_type_id, Utc::now())
            .await
    }

    /// Slots for one specific date, flattened.
    pub async fn get_slots_for_date(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        consultation_type_id: Option<Uuid>,
    ) -> Result<SingleDayResponse, AvailabilityError> {
        let day = self
            .generate_range(practitioner_id, date, date, consultation_type_id, Utc::now())
            .await?
            .days
            .into_iter()
            .next()
            .ok_or_else(|| AvailabilityError::Database("Empty day range".to_string()))?;

        Ok(SingleDayResponse {
            date: day.date,
            total_available: day.slots_count,
            slots: day.slots,
        })
    }

    /// Range generation with an injected clock, so lead-time behaviour is
    /// deterministic under test.
    pub async fn generate_range(
        &self,
        practitioner_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        consultation_type_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<SlotRangeResponse, AvailabilityError> {
        if end < start {
            return Err(AvailabilityError::Validation(
                "La date de fin doit suivre la date de début".to_string(),
            ));
        }

        let max_end = start + Duration::days(self.defaults.max_range_days - 1);
        let end = end.min(max_end);

        let duration = self.resolve_duration(consultation_type_id).await?;

        let filter = WindowFilter::default();
        let windows = self.repo.list(practitioner_id, &filter).await?;

        let range_start = start.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let range_end = (end + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap().and_utc();
        let booked = self
            .repo
            .list_booked_intervals(practitioner_id, range_start, range_end)
            .await?;

        debug!(
            "Generating slots for practitioner {} from {} to {} ({} booked intervals)",
            practitioner_id,
            start,
            end,
            booked.len()
        );

        let mut days = Vec::new();
        let mut date = start;
        while date <= end {
            days.push(self.build_day(date, &windows, &booked, duration, now));
            date += Duration::days(1);
        }

        let days_with_availability = days.iter().filter(|d| d.is_available).count();

        Ok(SlotRangeResponse {
            total_days: days.len(),
            days_with_availability,
            consultation_duration: duration,
            days,
        })
    }

    async fn resolve_duration(
        &self,
        consultation_type_id: Option<Uuid>,
    ) -> Result<i32, AvailabilityError> {
        let Some(id) = consultation_type_id else {
            return Ok(self.defaults.default_duration_minutes);
        };

        match self.repo.get_consultation_type(id).await? {
            // A non-positive duration would stall the slot cursor; treat the
            // row as misconfigured and use the default.
            Some(ct) if ct.default_duration_minutes > 0 => Ok(ct.default_duration_minutes),
            Some(ct) => {
                warn!(
                    "Consultation type {} has invalid duration {}, using default",
                    ct.id, ct.default_duration_minutes
                );
                Ok(self.defaults.default_duration_minutes)
            }
            None => Ok(self.defaults.default_duration_minutes),
        }
    }

    fn build_day(
        &self,
        date: NaiveDate,
        windows: &[AvailabilityWindow],
        booked: &[BookedInterval],
        duration_minutes: i32,
        now: DateTime<Utc>,
    ) -> DaySchedule {
        let intervals = self.working_intervals(date, windows);
        let lead_limit = now + Duration::minutes(self.defaults.lead_time_minutes);
        let is_today = date == now.date_naive();

        let mut slots = Vec::new();
        for (interval_start, interval_end) in intervals {
            let start_min = minutes_from_midnight(interval_start);
            let end_min = minutes_from_midnight(interval_end);

            let mut cursor = start_min;
            // A slot is emitted only when it fits whole inside the interval,
            // so breaks between intervals are skipped, never truncated.
            while cursor + duration_minutes as u32 <= end_min {
                let slot_time = time_from_minutes(cursor);
                let slot_start = date.and_time(slot_time).and_utc();
                let slot_end = slot_start + Duration::minutes(duration_minutes as i64);

                let mut available = !booked.iter().any(|b| b.overlaps(slot_start, slot_end));

                // Same-day slots inside the lead-time buffer stay visible but
                // cannot be booked.
                if is_today && slot_start < lead_limit {
                    available = false;
                }

                slots.push(TimeSlot {
                    time: format!("{:02}:{:02}", cursor / 60, cursor % 60),
                    available,
                    visio_available: available,
                    cabinet_available: available,
                });

                cursor += duration_minutes as u32;
            }
        }

        let slots_count = slots.iter().filter(|s| s.available).count();

        DaySchedule {
            date,
            day_number: date.day(),
            day_name: french_day_name(date.weekday()).to_string(),
            month_name: french_month_name(date.month()).to_string(),
            is_available: slots_count > 0,
            slots,
            slots_count,
        }
    }

    /// Working intervals for one day. Exception windows replace the recurring
    /// set; active recurring windows take precedence over the static
    /// defaults; blocked windows are subtracted last.
    fn working_intervals(
        &self,
        date: NaiveDate,
        windows: &[AvailabilityWindow],
    ) -> Vec<(NaiveTime, NaiveTime)> {
        let day_of_week = date.weekday().num_days_from_sunday() as i32;

        let exceptions: Vec<_> = windows
            .iter()
            .filter(|w| {
                w.window_type == WindowType::Exception
                    && w.is_active
                    && w.specific_date == Some(date)
            })
            .collect();

        let mut intervals: Vec<(NaiveTime, NaiveTime)> = if !exceptions.is_empty() {
            exceptions.iter().map(|w| (w.start_time, w.end_time)).collect()
        } else {
            let recurring: Vec<_> = windows
                .iter()
                .filter(|w| {
                    w.window_type == WindowType::Recurring
                        && w.is_active
                        && w.day_of_week == Some(day_of_week)
                        && w.applies_on(date)
                })
                .collect();

            if !recurring.is_empty() {
                recurring.iter().map(|w| (w.start_time, w.end_time)).collect()
            } else if self.defaults.is_working_day(date.weekday()) {
                vec![
                    (self.defaults.day_start, self.defaults.break_start),
                    (self.defaults.break_end, self.defaults.day_end),
                ]
            } else {
                Vec::new()
            }
        };

        intervals.sort_by_key(|(start, _)| *start);

        for blocked in windows.iter().filter(|w| {
            w.window_type == WindowType::Blocked && w.is_active && w.specific_date == Some(date)
        }) {
            intervals = subtract_interval(intervals, blocked.start_time, blocked.end_time);
        }

        intervals
    }
}

fn minutes_from_midnight(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn time_from_minutes(minutes: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap()
}

fn subtract_interval(
    intervals: Vec<(NaiveTime, NaiveTime)>,
    block_start: NaiveTime,
    block_end: NaiveTime,
) -> Vec<(NaiveTime, NaiveTime)> {
    let mut result = Vec::with_capacity(intervals.len());

    for (start, end) in intervals {
        if block_end <= start || block_start >= end {
            result.push((start, end));
            continue;
        }
        if block_start > start {
            result.push((start, block_start));
        }
        if block_end < end {
            result.push((block_end, end));
        }
    }

    result
}
