//! crates/attendance_core/src/stats.rs
//!
//! Monthly statistics. Everything here is a pure projection of the members and
//! sessions passed in and is recomputed from scratch on each call.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{Member, Session, Slot, YearMonth};

/// A count per slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts([usize; 3]);

impl SlotCounts {
    pub fn get(&self, slot: Slot) -> usize {
        self.0[slot.index()]
    }

    pub fn add(&mut self, slot: Slot, n: usize) {
        self.0[slot.index()] += n;
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, usize)> + '_ {
        Slot::ALL.into_iter().map(|slot| (slot, self.get(slot)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStats {
    pub member_id: Uuid,
    pub name: String,
    pub slots: SlotCounts,
    pub total: usize,
    /// Percentage of the month's sessions attended, rounded.
    pub rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryStats {
    pub slots: SlotCounts,
    pub total: usize,
}

/// Who attended on one date. Slots with nobody present have no entry in `present`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyDetail {
    pub date: NaiveDate,
    pub present: BTreeMap<Slot, Vec<String>>,
    pub counts: SlotCounts,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyReport {
    pub month: YearMonth,
    pub session_count: usize,
    /// Sorted by total attendance, highest first; ties by name.
    pub members: Vec<MemberStats>,
    pub summary: SummaryStats,
    /// Most recent date first.
    pub daily: Vec<DailyDetail>,
}

pub fn monthly_report(members: &[Member], sessions: &[Session], month: YearMonth) -> MonthlyReport {
    let monthly: Vec<&Session> = sessions
        .iter()
        .filter(|s| month.contains(s.key.date))
        .collect();

    MonthlyReport {
        month,
        session_count: monthly.len(),
        members: member_stats(members, &monthly),
        summary: summary_stats(&monthly),
        daily: daily_detail(members, &monthly),
    }
}

fn member_stats(members: &[Member], monthly: &[&Session]) -> Vec<MemberStats> {
    let mut stats: Vec<MemberStats> = members
        .iter()
        .map(|member| {
            let mut slots = SlotCounts::default();
            for session in monthly.iter().filter(|s| s.present_ids.contains(&member.id)) {
                slots.add(session.key.slot, 1);
            }
            let total = slots.total();
            MemberStats {
                member_id: member.id,
                name: member.name.clone(),
                slots,
                total,
                rate: attendance_rate(total, monthly.len()),
            }
        })
        .collect();

    stats.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    stats
}

fn attendance_rate(attended: usize, sessions: usize) -> u32 {
    if sessions == 0 {
        return 0;
    }
    (attended as f64 * 100.0 / sessions as f64).round() as u32
}

fn summary_stats(monthly: &[&Session]) -> SummaryStats {
    let mut slots = SlotCounts::default();
    for session in monthly {
        slots.add(session.key.slot, session.present_ids.len());
    }
    SummaryStats {
        total: slots.total(),
        slots,
    }
}

fn daily_detail(members: &[Member], monthly: &[&Session]) -> Vec<DailyDetail> {
    let names: HashMap<Uuid, &str> = members.iter().map(|m| (m.id, m.name.as_str())).collect();

    let mut by_date: BTreeMap<NaiveDate, DailyDetail> = BTreeMap::new();
    for session in monthly.iter().filter(|s| !s.present_ids.is_empty()) {
        let day = by_date.entry(session.key.date).or_insert_with(|| DailyDetail {
            date: session.key.date,
            present: BTreeMap::new(),
            counts: SlotCounts::default(),
            total: 0,
        });

        // Ids without a member are counted but never named.
        let mut present: Vec<String> = session
            .present_ids
            .iter()
            .filter_map(|id| names.get(id).map(|n| n.to_string()))
            .collect();
        present.sort();

        day.counts.add(session.key.slot, session.present_ids.len());
        day.total += session.present_ids.len();
        day.present.insert(session.key.slot, present);
    }

    by_date.into_values().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PresenceSet, SessionKey};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session(date: NaiveDate, slot: Slot, ids: &[Uuid]) -> Session {
        Session::new(
            SessionKey::new(date, slot),
            ids.iter().copied().collect::<PresenceSet>(),
        )
    }

    #[test]
    fn summary_covers_every_slot() {
        let members: Vec<Member> = ["김민수", "이영희", "박지성"].iter().map(|n| Member::new(n)).collect();
        let ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
        let sessions = vec![
            session(date(2024, 3, 1), Slot::Morning, &ids[..2]),
            session(date(2024, 3, 4), Slot::Morning, &ids[2..]),
        ];

        let report = monthly_report(&members, &sessions, "2024-03".parse().unwrap());

        assert_eq!(report.summary.slots.get(Slot::Morning), 3);
        assert_eq!(report.summary.slots.get(Slot::Afternoon), 0);
        assert_eq!(report.summary.slots.get(Slot::Evening), 0);
        assert_eq!(report.summary.total, 3);
        assert!(report
            .daily
            .iter()
            .all(|d| !d.present.contains_key(&Slot::Afternoon)));
    }

    #[test]
    fn member_stats_sorted_by_total_with_rate() {
        let kim = Member::new("김민수");
        let lee = Member::new("이영희");
        let sessions = vec![
            session(date(2024, 3, 1), Slot::Morning, &[kim.id, lee.id]),
            session(date(2024, 3, 1), Slot::Evening, &[lee.id]),
            session(date(2024, 3, 2), Slot::Afternoon, &[lee.id]),
            session(date(2024, 3, 3), Slot::Afternoon, &[]),
            // Outside the month.
            session(date(2024, 4, 1), Slot::Morning, &[kim.id]),
        ];

        let report = monthly_report(&[kim.clone(), lee.clone()], &sessions, "2024-03".parse().unwrap());

        assert_eq!(report.session_count, 4);
        assert_eq!(report.members[0].name, "이영희");
        assert_eq!(report.members[0].total, 3);
        assert_eq!(report.members[0].slots.get(Slot::Afternoon), 1);
        assert_eq!(report.members[0].rate, 75);
        assert_eq!(report.members[1].name, "김민수");
        assert_eq!(report.members[1].total, 1);
        assert_eq!(report.members[1].rate, 25);
    }

    #[test]
    fn daily_detail_is_newest_first_and_skips_empty_days() {
        let kim = Member::new("김민수");
        let sessions = vec![
            session(date(2024, 3, 1), Slot::Morning, &[kim.id]),
            session(date(2024, 3, 5), Slot::Evening, &[kim.id]),
            session(date(2024, 3, 9), Slot::Morning, &[]),
        ];

        let report = monthly_report(&[kim], &sessions, "2024-03".parse().unwrap());

        let dates: Vec<_> = report.daily.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date(2024, 3, 5), date(2024, 3, 1)]);
        assert_eq!(report.daily[0].present[&Slot::Evening], vec!["김민수".to_string()]);
        assert_eq!(report.daily[0].total, 1);
    }

    #[test]
    fn dangling_ids_are_counted_but_not_named() {
        let kim = Member::new("김민수");
        let ghost = Uuid::new_v4();
        let sessions = vec![session(date(2024, 3, 1), Slot::Morning, &[kim.id, ghost])];

        let report = monthly_report(&[kim], &sessions, "2024-03".parse().unwrap());

        let day = &report.daily[0];
        assert_eq!(day.present[&Slot::Morning], vec!["김민수".to_string()]);
        assert_eq!(day.counts.get(Slot::Morning), 2);
    }

    #[test]
    fn empty_month_has_zero_rates() {
        let kim = Member::new("김민수");
        let report = monthly_report(&[kim], &[], "2024-03".parse().unwrap());
        assert_eq!(report.members[0].rate, 0);
        assert!(report.daily.is_empty());
        assert_eq!(report.summary.total, 0);
    }
}
