// libs/availability-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY WINDOW MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// Repeats weekly on `day_of_week`.
    Recurring,
    /// One-off override for `specific_date`; replaces the recurring set that day.
    Exception,
    /// Explicitly unavailable interval on `specific_date`.
    Blocked,
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowType::Recurring => write!(f, "recurring"),
            WindowType::Exception => write!(f, "exception"),
            WindowType::Blocked => write!(f, "blocked"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub window_type: WindowType,
    /// 0 = Sunday .. 6 = Saturday; set for recurring windows.
    pub day_of_week: Option<i32>,
    /// Set for exception and blocked windows.
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub visio_available: bool,
    pub cabinet_available: bool,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityWindow {
    /// Whether the window's validity range contains the given date.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        if let Some(from) = self.valid_from {
            if date < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if date > until {
                return false;
            }
        }
        true
    }

    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start < self.end_time && end > self.start_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationType {
    pub id: Uuid,
    pub code: String,
    pub default_duration_minutes: i32,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWindowRequest {
    /// Omitted by practitioners creating their own windows; admins may set it.
    pub practitioner_id: Option<Uuid>,
    pub window_type: WindowType,
    pub day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub visio_available: Option<bool>,
    pub cabinet_available: Option<bool>,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
}

/// Validated window data handed to the repository for persistence.
#[derive(Debug, Clone)]
pub struct NewAvailabilityWindow {
    pub practitioner_id: Uuid,
    pub window_type: WindowType,
    pub day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub visio_available: bool,
    pub cabinet_available: bool,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    /// Wall-clock start, "HH:mm".
    pub time: String,
    pub available: bool,
    pub visio_available: bool,
    pub cabinet_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub day_number: u32,
    pub day_name: String,
    pub month_name: String,
    pub is_available: bool,
    pub slots: Vec<TimeSlot>,
    /// Number of *available* slots; a fully booked day reports 0.
    pub slots_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRangeResponse {
    pub days: Vec<DaySchedule>,
    pub total_days: usize,
    pub days_with_availability: usize,
    pub consultation_duration: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleDayResponse {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
    pub total_available: usize,
}

/// Already-booked interval, compared as absolute instants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookedInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookedInterval {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

// ==============================================================================
// SCHEDULING DEFAULTS
// ==============================================================================

/// Static fallback schedule, used for weekdays where the practitioner has no
/// active recurring window configured.
#[derive(Debug, Clone)]
pub struct SchedulingDefaults {
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub break_start: NaiveTime,
    pub break_end: NaiveTime,
    pub lead_time_minutes: i64,
    pub default_duration_minutes: i32,
    pub max_range_days: i64,
}

impl Default for SchedulingDefaults {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            break_start: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            break_end: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            lead_time_minutes: 120,
            default_duration_minutes: 30,
            max_range_days: 60,
        }
    }
}

impl SchedulingDefaults {
    pub fn is_working_day(&self, weekday: Weekday) -> bool {
        !matches!(weekday, Weekday::Sat | Weekday::Sun)
    }
}

// ==============================================================================
// LOCALIZED CALENDAR NAMES
// ==============================================================================

pub fn french_day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "lundi",
        Weekday::Tue => "mardi",
        Weekday::Wed => "mercredi",
        Weekday::Thu => "jeudi",
        Weekday::Fri => "vendredi",
        Weekday::Sat => "samedi",
        Weekday::Sun => "dimanche",
    }
}

pub fn french_month_name(month: u32) -> &'static str {
    match month {
        1 => "janvier",
        2 => "février",
        3 => "mars",
        4 => "avril",
        5 => "mai",
        6 => "juin",
        7 => "juillet",
        8 => "août",
        9 => "septembre",
        10 => "octobre",
        11 => "novembre",
        _ => "décembre",
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ce créneau chevauche une disponibilité existante")]
    Overlap,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}
