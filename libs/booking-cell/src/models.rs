// libs/booking-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sentinel `status_reason` marking a pending appointment as awaiting the
/// patient's answer to a practitioner counter-proposal.
pub const COUNTER_PROPOSAL_REASON: &str = "counter_proposal";

/// Default reason recorded when a patient declines a counter-proposal
/// without giving one.
pub const DECLINE_DEFAULT_REASON: &str = "Nouvel horaire refusé";

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

/// Appointment lifecycle state. The storage layer keeps the legacy
/// `(status, status_reason)` column pair; this enum makes the illegal
/// combinations unrepresentable in the domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppointmentStatus {
    Pending,
    PendingCounterProposal,
    Confirmed,
    CancelledByPatient { reason: Option<String> },
    CancelledByNutritionist { reason: Option<String> },
    /// Set by an out-of-band completion process; terminal, never written here.
    Completed,
}

impl AppointmentStatus {
    /// Column pair for persistence.
    pub fn as_parts(&self) -> (&'static str, Option<&str>) {
        match self {
            AppointmentStatus::Pending => ("pending", None),
            AppointmentStatus::PendingCounterProposal => {
                ("pending", Some(COUNTER_PROPOSAL_REASON))
            }
            AppointmentStatus::Confirmed => ("confirmed", None),
            AppointmentStatus::CancelledByPatient { reason } => {
                ("cancelled_by_patient", reason.as_deref())
            }
            AppointmentStatus::CancelledByNutritionist { reason } => {
                ("cancelled_by_nutritionist", reason.as_deref())
            }
            AppointmentStatus::Completed => ("completed", None),
        }
    }

    pub fn from_parts(status: &str, reason: Option<&str>) -> Result<Self, BookingError> {
        match status {
            "pending" if reason == Some(COUNTER_PROPOSAL_REASON) => {
                Ok(AppointmentStatus::PendingCounterProposal)
            }
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled_by_patient" => Ok(AppointmentStatus::CancelledByPatient {
                reason: reason.map(str::to_string),
            }),
            "cancelled_by_nutritionist" => Ok(AppointmentStatus::CancelledByNutritionist {
                reason: reason.map(str::to_string),
            }),
            "completed" => Ok(AppointmentStatus::Completed),
            other => Err(BookingError::Database(format!(
                "Unknown appointment status: {}",
                other
            ))),
        }
    }

    /// Still occupies the practitioner's timeslot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending
                | AppointmentStatus::PendingCounterProposal
                | AppointmentStatus::Confirmed
        )
    }

    pub fn is_awaiting_response(&self) -> bool {
        matches!(self, AppointmentStatus::PendingCounterProposal)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (status, reason) = self.as_parts();
        match reason {
            Some(reason) => write!(f, "{} ({})", status, reason),
            None => write!(f, "{}", status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    Visio,
    Cabinet,
    Phone,
}

impl fmt::Display for ConsultationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationMode::Visio => write!(f, "visio"),
            ConsultationMode::Cabinet => write!(f, "cabinet"),
            ConsultationMode::Phone => write!(f, "phone"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Nutritionist,
}

impl fmt::Display for CancelledBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelledBy::Patient => write!(f, "patient"),
            CancelledBy::Nutritionist => write!(f, "nutritionist"),
        }
    }
}

// ==============================================================================
// APPOINTMENT
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub scheduled_end_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub status_changed_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
    pub mode: ConsultationMode,
    pub consultation_type_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration_minutes(&self) -> i64 {
        (self.scheduled_end_at - self.scheduled_at).num_minutes()
    }

    pub fn from_record(record: AppointmentRecord) -> Result<Self, BookingError> {
        let status =
            AppointmentStatus::from_parts(&record.status, record.status_reason.as_deref())?;
        Ok(Self {
            id: record.id,
            patient_id: record.patient_id,
            practitioner_id: record.practitioner_id,
            scheduled_at: record.scheduled_at,
            scheduled_end_at: record.scheduled_end_at,
            status,
            status_changed_at: record.status_changed_at,
            cancelled_at: record.cancelled_at,
            cancelled_by: record.cancelled_by,
            mode: record.mode,
            consultation_type_id: record.consultation_type_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn to_record(&self) -> AppointmentRecord {
        let (status, status_reason) = self.status.as_parts();
        AppointmentRecord {
            id: self.id,
            patient_id: self.patient_id,
            practitioner_id: self.practitioner_id,
            scheduled_at: self.scheduled_at,
            scheduled_end_at: self.scheduled_end_at,
            status: status.to_string(),
            status_reason: status_reason.map(str::to_string),
            status_changed_at: self.status_changed_at,
            cancelled_at: self.cancelled_at,
            cancelled_by: self.cancelled_by,
            mode: self.mode,
            consultation_type_id: self.consultation_type_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Wire/storage form of an appointment: the flat column layout with the
/// `(status, status_reason)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub scheduled_end_at: DateTime<Utc>,
    pub status: String,
    pub status_reason: Option<String>,
    pub status_changed_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
    pub mode: ConsultationMode,
    pub consultation_type_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub consultation_type_id: Option<Uuid>,
    pub mode: ConsultationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeNewTimeRequest {
    pub new_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondToProposalRequest {
    pub action: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

/// Validated booking data handed to the repository for insertion.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub scheduled_end_at: DateTime<Utc>,
    pub mode: ConsultationMode,
    pub consultation_type_id: Option<Uuid>,
}

/// Partial update applied through the repository. Only set fields are
/// written.
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub status: Option<AppointmentStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub scheduled_end_at: Option<DateTime<Utc>>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Database error: {0}")]
    Database(String),
}
