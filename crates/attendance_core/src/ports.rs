//! crates/attendance_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the storage backend and of the local clock.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use futures::Stream;
use uuid::Uuid;

use crate::domain::{Member, RosterChange, RosterId, Session, SessionKey};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, file system).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The write collided with a uniqueness constraint held by the store.
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The stream handed out by [`AttendanceRepository::subscribe`].
pub type RosterChangeStream = Pin<Box<dyn Stream<Item = RosterChange> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage for rosters. Every method is scoped by a roster id; two rosters
/// never share members or sessions.
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    // --- Members ---
    async fn read_members(&self, roster: &RosterId) -> PortResult<Vec<Member>>;

    async fn write_member(&self, roster: &RosterId, member: &Member) -> PortResult<()>;

    async fn delete_member(&self, roster: &RosterId, member_id: Uuid) -> PortResult<()>;

    // --- Sessions ---
    async fn read_sessions(&self, roster: &RosterId) -> PortResult<BTreeMap<SessionKey, Session>>;

    /// Reads a single session. Used to re-read the latest presence immediately
    /// before a read-modify-write.
    async fn read_session(&self, roster: &RosterId, key: &SessionKey)
        -> PortResult<Option<Session>>;

    /// Writes the whole session document; last writer wins.
    async fn write_session(&self, roster: &RosterId, session: &Session) -> PortResult<()>;

    // --- Live Updates ---
    /// Returns a stream of changes made to the roster from now on, by any writer
    /// the backend can observe.
    async fn subscribe(&self, roster: &RosterId) -> PortResult<RosterChangeStream>;
}

/// Supplies "today" as the viewer sees it.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Reads the calendar date from the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
