//! crates/attendance_core/src/domain.rs
//!
//! Defines the pure, core data structures for the attendance engine.
//! These structs are independent of any database or serialization format.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AttendanceError, AttendanceResult};

//=========================================================================================
// Roster Identity
//=========================================================================================

/// The class/channel identifier that scopes a roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RosterId(String);

impl RosterId {
    pub fn new(raw: impl AsRef<str>) -> AttendanceResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AttendanceError::InvalidRosterId(raw.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier with every character outside `[A-Za-z0-9가-힣]` replaced by `_`,
    /// suitable as a storage collection key.
    pub fn storage_key(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || ('가'..='힣').contains(&c) {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for RosterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=========================================================================================
// Members
//=========================================================================================

/// A named person on a roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Creates a member with a freshly generated id. The name is stored trimmed.
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

//=========================================================================================
// Slots and Session Keys
//=========================================================================================

/// A recurring time-of-day period during which attendance is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Morning,
    Afternoon,
    Evening,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Morning, Slot::Afternoon, Slot::Evening];

    pub fn label(self) -> &'static str {
        match self {
            Slot::Morning => "오전",
            Slot::Afternoon => "오후",
            Slot::Evening => "저녁",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Slot::Morning => 0,
            Slot::Afternoon => 1,
            Slot::Evening => 2,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Slot {
    type Err = AttendanceError;

    /// Accepts the Korean labels as well as their English names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "오전" | "morning" => Ok(Slot::Morning),
            "오후" | "afternoon" => Ok(Slot::Afternoon),
            "저녁" | "evening" => Ok(Slot::Evening),
            other => Err(AttendanceError::InvalidSlot(other.to_string())),
        }
    }
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> AttendanceResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AttendanceError::InvalidDate(s.to_string()))
}

/// Identifies one session: a (date, slot) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub date: NaiveDate,
    pub slot: Slot,
}

impl SessionKey {
    pub fn new(date: NaiveDate, slot: Slot) -> Self {
        Self { date, slot }
    }

    /// Builds a key from its textual parts, validating both.
    pub fn parse(date: &str, slot: &str) -> AttendanceResult<Self> {
        Ok(Self::new(parse_date(date)?, slot.parse()?))
    }

    /// The deterministic document id, e.g. `2024-03-01_오전`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.date.format("%Y-%m-%d"), self.slot.label())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl FromStr for SessionKey {
    type Err = AttendanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, slot) = s
            .split_once('_')
            .ok_or_else(|| AttendanceError::InvalidDate(s.to_string()))?;
        Self::parse(date, slot)
    }
}

//=========================================================================================
// Presence
//=========================================================================================

/// The set of member ids marked present for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet(BTreeSet<Uuid>);

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.0.contains(id)
    }

    /// Returns `true` if the id was not already present.
    pub fn insert(&mut self, id: Uuid) -> bool {
        self.0.insert(id)
    }

    /// Returns `true` if the id was present.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        self.0.remove(id)
    }

    pub fn union(&self, other: &PresenceSet) -> PresenceSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Ids in `self` that are not in `other`.
    pub fn difference(&self, other: &PresenceSet) -> PresenceSet {
        Self(self.0.difference(&other.0).copied().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.0.iter()
    }
}

impl FromIterator<Uuid> for PresenceSet {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PresenceSet {
    type Item = Uuid;
    type IntoIter = std::collections::btree_set::IntoIter<Uuid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The attendance record for one (date, slot) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub key: SessionKey,
    pub present_ids: PresenceSet,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey, present_ids: PresenceSet) -> Self {
        Self {
            key,
            present_ids,
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> String {
        self.key.id()
    }
}

//=========================================================================================
// Reporting Periods
//=========================================================================================

/// A calendar month selected for statistics, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> AttendanceResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(AttendanceError::InvalidMonth(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AttendanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AttendanceError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

//=========================================================================================
// Live Updates
//=========================================================================================

/// A notification pushed to subscribers when a roster's persisted state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    MemberWritten { member_id: Uuid },
    MemberDeleted { member_id: Uuid },
    SessionWritten { key: SessionKey },
}
