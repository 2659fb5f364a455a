//! crates/attendance_core/src/error.rs
//!
//! The error taxonomy of the reconciliation engine. Every variant is locally
//! recoverable: a failed operation leaves roster and session state untouched.

use uuid::Uuid;

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    /// A member with this exact (trimmed) name is already on the roster.
    #[error("'{0}' is already on the roster")]
    DuplicateName(String),

    /// The member is referenced by at least one session and cannot be deleted.
    #[error("'{name}' has attendance records and cannot be removed")]
    MemberHasAttendance { id: Uuid, name: String },

    /// Ingestion was called with blank text.
    #[error("There is no text to ingest")]
    EmptyInput,

    #[error("Invalid member name: '{0}'")]
    InvalidName(String),

    #[error("Member {0} is not on the roster")]
    UnknownMember(Uuid),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid slot '{0}'")]
    InvalidSlot(String),

    #[error("Invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Invalid roster id '{0}'")]
    InvalidRosterId(String),

    #[error("Invalid weekly schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid check-in link: {0}")]
    InvalidLink(String),

    /// A failure reported by one of the collaborator ports (storage, subscription).
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),
}

/// A convenience type alias for `Result<T, AttendanceError>`.
pub type AttendanceResult<T> = Result<T, AttendanceError>;
