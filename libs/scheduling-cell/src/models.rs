// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: Option<i64>,
    pub department_id: i64,
    pub professional_id: Option<i64>,
    pub room_id: Option<i64>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub origin: AppointmentOrigin,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Absent,
}

impl AppointmentStatus {
    /// Active appointments block re-scheduling of their department.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Absent => write!(f, "absent"),
        }
    }
}

/// How an appointment row came to exist. Auto-scheduled rows are created by
/// the proposal pipeline and can be bulk-cancelled by origin, without
/// inspecting free-text notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentOrigin {
    Manual,
    AutoScheduled,
}

impl fmt::Display for AppointmentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentOrigin::Manual => write!(f, "manual"),
            AppointmentOrigin::AutoScheduled => write!(f, "auto_scheduled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub default_duration_minutes: Option<i32>,
    pub responsible_professional_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Professional {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Professional {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| RoleKind::parse(r) == RoleKind::Admin)
    }
}

/// Closed role vocabulary. Free-text role names from the staff catalog are
/// normalized here once, at the data edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Admin,
    Secretary,
    Clinician,
    Other,
}

impl RoleKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "admin" | "administrator" | "administrador" | "administradora" => RoleKind::Admin,
            "secretary" | "secretaria" | "secretario" => RoleKind::Secretary,
            "professional" | "clinician" | "profesional" => RoleKind::Clinician,
            _ => RoleKind::Other,
        }
    }
}

// ==============================================================================
// DEPARTMENT REQUIREMENTS
// ==============================================================================

/// Raw requirement row as stored. `state` is free text maintained by the
/// enrollment workflows; it is normalized via [`RequirementState::parse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentRequirement {
    pub id: i64,
    pub patient_id: i64,
    pub department_id: i64,
    pub duration_minutes: Option<i32>,
    pub professional_id: Option<i64>,
    pub state: String,
}

impl DepartmentRequirement {
    pub fn state(&self) -> RequirementState {
        RequirementState::parse(&self.state)
    }
}

/// Closed lifecycle vocabulary for requirements. The catalog stores gendered
/// Spanish variants; anything not recognized as terminal stays schedulable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementState {
    Pending,
    Finalized,
    Closed,
    Cancelled,
}

impl RequirementState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "finalized" | "finalizado" | "finalizada" => RequirementState::Finalized,
            "closed" | "cerrado" | "cerrada" => RequirementState::Closed,
            "cancelled" | "canceled" | "cancelado" | "cancelada" => RequirementState::Cancelled,
            _ => RequirementState::Pending,
        }
    }

    pub fn is_excluded(&self) -> bool {
        !matches!(self, RequirementState::Pending)
    }
}

/// A requirement that survived lifecycle and dedup filtering, joined with
/// its department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequirement {
    pub requirement_id: i64,
    pub department_id: i64,
    pub department_name: String,
    pub duration_minutes: i32,
    pub assigned_professional_id: Option<i64>,
    pub responsible_professional_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    AlreadyScheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedDepartment {
    pub department_id: i64,
    pub reason: ExclusionReason,
}

// ==============================================================================
// PROPOSALS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundSlot {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub room_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionalCandidate {
    pub professional_id: i64,
    pub full_name: String,
    pub is_responsible: bool,
    pub is_admin: bool,
    pub selected: bool,
}

/// An appointment draft handed back to the operator for confirmation.
/// Nothing is persisted by this cell; the write path re-validates
/// non-overlap at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedAppointment {
    pub department_id: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub room_id: i64,
    pub professional_id: Option<i64>,
    pub status: AppointmentStatus,
    pub origin: AppointmentOrigin,
    pub notes: String,
    pub candidates: Vec<ProfessionalCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleProposalRequest {
    #[serde(default)]
    pub base_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferred_room_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleProposalResponse {
    pub slot: Option<FoundSlot>,
    pub proposals: Vec<ProposedAppointment>,
    pub excluded: Vec<ExcludedDepartment>,
}

// ==============================================================================
// POLICY
// ==============================================================================

/// Clinic scheduling policy. Intake visits are only ever proposed on a
/// single weekday; which one is a policy knob rather than a hardcoded value.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    pub intake_weekday: Weekday,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub step_minutes: i64,
    pub max_weeks_ahead: u32,
    pub default_duration_minutes: i32,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            intake_weekday: Weekday::Mon,
            opens_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            closes_at: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            step_minutes: 30,
            max_weeks_ahead: 12,
            default_duration_minutes: 30,
        }
    }
}

impl SchedulingPolicy {
    pub fn step(&self) -> Duration {
        Duration::minutes(self.step_minutes)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No availability found within {weeks_searched} weeks")]
    NoAvailability { weeks_searched: u32 },

    #[error("Department {0} not found")]
    DepartmentNotFound(i64),

    #[error("Database error: {0}")]
    Database(String),
}
