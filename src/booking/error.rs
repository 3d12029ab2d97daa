use ulid::Ulid;

use crate::model::{AppointmentStatus, ServiceId, StaffId};

#[derive(Debug)]
pub enum BookingError {
    /// Unknown service, or one whose resolved duration is zero.
    InvalidService(ServiceId),
    /// Unknown, inactive, or unqualified staff member.
    InvalidStaff(StaffId),
    /// The requested start is no longer among the generated slots.
    SlotNoLongerAvailable,
    /// The atomic write found an overlapping appointment.
    Conflict(Ulid),
    NotFound(String),
    AlreadyCancelled(Ulid),
    TooLateToCancel(Ulid),
    InvalidState {
        id: Ulid,
        status: AppointmentStatus,
    },
    InvalidSchedule(&'static str),
    InvalidConfig(&'static str),
    LimitExceeded(&'static str),
    PersistenceError(String),
}

impl BookingError {
    /// Recoverable by re-querying slots and offering alternatives.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BookingError::Conflict(_) | BookingError::SlotNoLongerAvailable
        )
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            BookingError::InvalidService(_) => "invalid_service",
            BookingError::InvalidStaff(_) => "invalid_staff",
            BookingError::SlotNoLongerAvailable => "slot_unavailable",
            BookingError::Conflict(_) => "conflict",
            BookingError::NotFound(_) => "not_found",
            BookingError::AlreadyCancelled(_) => "already_cancelled",
            BookingError::TooLateToCancel(_) => "too_late_to_cancel",
            BookingError::InvalidState { .. } => "invalid_state",
            BookingError::InvalidSchedule(_) => "invalid_schedule",
            BookingError::InvalidConfig(_) => "invalid_config",
            BookingError::LimitExceeded(_) => "limit_exceeded",
            BookingError::PersistenceError(_) => "persistence_error",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidService(id) => write!(f, "invalid service: {id}"),
            BookingError::InvalidStaff(id) => write!(f, "invalid staff member: {id}"),
            BookingError::SlotNoLongerAvailable => write!(f, "slot is no longer available"),
            BookingError::Conflict(id) => write!(f, "conflict with appointment: {id}"),
            BookingError::NotFound(what) => write!(f, "not found: {what}"),
            BookingError::AlreadyCancelled(id) => write!(f, "appointment {id} is already cancelled"),
            BookingError::TooLateToCancel(id) => {
                write!(f, "appointment {id} is past its cancellation cutoff")
            }
            BookingError::InvalidState { id, status } => {
                write!(f, "appointment {id} cannot change from status {status}")
            }
            BookingError::InvalidSchedule(msg) => write!(f, "invalid schedule: {msg}"),
            BookingError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::PersistenceError(e) => write!(f, "persistence error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<std::io::Error> for BookingError {
    fn from(e: std::io::Error) -> Self {
        BookingError::PersistenceError(e.to_string())
    }
}
