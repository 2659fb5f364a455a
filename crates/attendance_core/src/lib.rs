pub mod domain;
pub mod error;
pub mod extractor;
pub mod memory;
pub mod ports;
pub mod reconcile;
pub mod roster;
pub mod schedule;
pub mod sessions;
pub mod stats;

pub use domain::{
    Member, PresenceSet, RosterChange, RosterId, Session, SessionKey, Slot, YearMonth,
};
pub use error::{AttendanceError, AttendanceResult};
pub use extractor::extract_names;
pub use memory::InMemoryRepository;
pub use ports::{
    AttendanceRepository, Clock, FixedClock, LocalClock, PortError, PortResult, RosterChangeStream,
};
pub use reconcile::{CheckInOutcome, IngestReport, Reconciler};
pub use roster::RosterStore;
pub use schedule::{CheckInLink, WeeklySchedule};
pub use sessions::SessionStore;
pub use stats::{monthly_report, DailyDetail, MemberStats, MonthlyReport, SlotCounts, SummaryStats};
