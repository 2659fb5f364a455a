//! crates/attendance_core/src/schedule.rs
//!
//! The weekly schedule table (which slots run on which weekday) and the
//! self-check-in links handed out for each of them.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Datelike, Weekday};
use url::Url;

use crate::domain::{RosterId, SessionKey, Slot};
use crate::error::{AttendanceError, AttendanceResult};

/// Weekdays in the order they are listed to admins.
pub const WEEK_MONDAY_FIRST: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "월요일",
        Weekday::Tue => "화요일",
        Weekday::Wed => "수요일",
        Weekday::Thu => "목요일",
        Weekday::Fri => "금요일",
        Weekday::Sat => "토요일",
        Weekday::Sun => "일요일",
    }
}

/// Accepts `월요일`, `월`, or anything chrono parses (`mon`, `Monday`).
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    let s = s.trim();
    WEEK_MONDAY_FIRST
        .into_iter()
        .find(|day| {
            let label = weekday_label(*day);
            s == label || label.strip_suffix("요일") == Some(s)
        })
        .or_else(|| s.parse::<Weekday>().ok())
}

//=========================================================================================
// Weekly Schedule
//=========================================================================================

/// Day-of-week → allowed slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    slots: [Vec<Slot>; 7],
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self::every_day()
    }
}

impl WeeklySchedule {
    /// Every slot on every day.
    pub fn every_day() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::ALL.to_vec()),
        }
    }

    pub fn empty() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    pub fn set(&mut self, day: Weekday, mut slots: Vec<Slot>) {
        slots.sort();
        slots.dedup();
        self.slots[day.num_days_from_monday() as usize] = slots;
    }

    pub fn allowed_slots(&self, day: Weekday) -> &[Slot] {
        &self.slots[day.num_days_from_monday() as usize]
    }

    pub fn allows(&self, key: &SessionKey) -> bool {
        self.allowed_slots(key.date.weekday()).contains(&key.slot)
    }
}

impl FromStr for WeeklySchedule {
    type Err = AttendanceError;

    /// Parses `mon=오전,오후;sat=오전`. Days that are not listed get no slots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut schedule = Self::empty();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (day, slots) = entry
                .split_once('=')
                .ok_or_else(|| AttendanceError::InvalidSchedule(entry.to_string()))?;
            let day = parse_weekday(day)
                .ok_or_else(|| AttendanceError::InvalidSchedule(format!("unknown weekday '{day}'")))?;
            let slots = slots
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<Slot>)
                .collect::<AttendanceResult<Vec<Slot>>>()?;
            schedule.set(day, slots);
        }
        Ok(schedule)
    }
}

//=========================================================================================
// Self-Check-In Links
//=========================================================================================

/// The context carried by a shareable self-check-in link:
/// `?mode=member&classId=<roster>&day=<weekday>&slot=<slot>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInLink {
    pub roster: RosterId,
    pub day: Weekday,
    pub slot: Slot,
}

impl CheckInLink {
    pub fn new(roster: RosterId, day: Weekday, slot: Slot) -> Self {
        Self { roster, day, slot }
    }

    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        let path = url.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            url.set_path(path.trim_end_matches('/'));
        }
        url.set_fragment(None);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("mode", "member")
            .append_pair("classId", self.roster.as_str())
            .append_pair("day", weekday_label(self.day))
            .append_pair("slot", self.slot.label());
        url
    }

    pub fn from_url(url: &Url) -> AttendanceResult<Self> {
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        Self::from_params(&params)
    }

    /// Parses already-decoded query parameters.
    pub fn from_params(params: &HashMap<String, String>) -> AttendanceResult<Self> {
        let get = |name: &str| {
            params
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| AttendanceError::InvalidLink(format!("missing '{name}'")))
        };

        if get("mode")? != "member" {
            return Err(AttendanceError::InvalidLink("not a member link".to_string()));
        }
        let roster = RosterId::new(get("classId")?)?;
        let day = get("day")?;
        let day = parse_weekday(day)
            .ok_or_else(|| AttendanceError::InvalidLink(format!("unknown weekday '{day}'")))?;
        let slot = get("slot")?.parse()?;
        Ok(Self { roster, day, slot })
    }
}

/// One link per weekday and allowed slot, Monday first.
pub fn weekly_links(roster: &RosterId, schedule: &WeeklySchedule) -> Vec<CheckInLink> {
    WEEK_MONDAY_FIRST
        .into_iter()
        .flat_map(|day| {
            schedule
                .allowed_slots(day)
                .iter()
                .map(move |slot| CheckInLink::new(roster.clone(), day, *slot))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_schedule_table() {
        let schedule: WeeklySchedule = "mon=오전,오후; 토요일=저녁".parse().unwrap();
        assert_eq!(schedule.allowed_slots(Weekday::Mon), &[Slot::Morning, Slot::Afternoon]);
        assert_eq!(schedule.allowed_slots(Weekday::Sat), &[Slot::Evening]);
        assert!(schedule.allowed_slots(Weekday::Sun).is_empty());

        // 2024-03-04 is a Monday.
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert!(schedule.allows(&SessionKey::new(monday, Slot::Morning)));
        assert!(!schedule.allows(&SessionKey::new(monday, Slot::Evening)));
    }

    #[test]
    fn rejects_malformed_schedule() {
        assert!("mon".parse::<WeeklySchedule>().is_err());
        assert!("someday=오전".parse::<WeeklySchedule>().is_err());
        assert!("mon=새벽".parse::<WeeklySchedule>().is_err());
    }

    #[test]
    fn link_round_trips_through_url() {
        let base = Url::parse("https://attend.example.com/app/").unwrap();
        let link = CheckInLink::new(RosterId::new("수요 성경반").unwrap(), Weekday::Wed, Slot::Evening);

        let url = link.to_url(&base);
        assert!(url.as_str().starts_with("https://attend.example.com/app?mode=member&classId="));
        assert_eq!(CheckInLink::from_url(&url).unwrap(), link);
    }

    #[test]
    fn admin_links_are_rejected() {
        let url = Url::parse("https://x.example/?mode=admin&classId=a&day=월요일&slot=오전").unwrap();
        assert!(matches!(
            CheckInLink::from_url(&url),
            Err(AttendanceError::InvalidLink(_))
        ));
    }

    #[test]
    fn weekly_links_follow_schedule() {
        let roster = RosterId::new("a반").unwrap();
        assert_eq!(weekly_links(&roster, &WeeklySchedule::every_day()).len(), 21);

        let schedule: WeeklySchedule = "sun=오전".parse().unwrap();
        let links = weekly_links(&roster, &schedule);
        assert_eq!(links, vec![CheckInLink::new(roster, Weekday::Sun, Slot::Morning)]);
    }
}
