//! crates/attendance_core/src/roster.rs
//!
//! The roster store: the members of one roster, with name uniqueness on
//! registration and referential integrity on deletion.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Member, RosterId};
use crate::error::{AttendanceError, AttendanceResult};
use crate::ports::{AttendanceRepository, PortError};

/// Member operations bound to one roster.
#[derive(Clone)]
pub struct RosterStore {
    roster: RosterId,
    repo: Arc<dyn AttendanceRepository>,
}

impl RosterStore {
    pub fn new(roster: RosterId, repo: Arc<dyn AttendanceRepository>) -> Self {
        Self { roster, repo }
    }

    pub fn roster_id(&self) -> &RosterId {
        &self.roster
    }

    /// All members, sorted by name. Precomposed Hangul syllables are laid out in
    /// 가나다 order in Unicode, so plain string ordering is the natural collation.
    pub async fn members(&self) -> AttendanceResult<Vec<Member>> {
        let mut members = self.repo.read_members(&self.roster).await?;
        sort_by_name(&mut members);
        Ok(members)
    }

    pub async fn find_by_id(&self, id: Uuid) -> AttendanceResult<Option<Member>> {
        let members = self.repo.read_members(&self.roster).await?;
        Ok(members.into_iter().find(|m| m.id == id))
    }

    /// Exact match against the trimmed name.
    pub async fn find_by_name(&self, name: &str) -> AttendanceResult<Option<Member>> {
        let name = name.trim();
        let members = self.repo.read_members(&self.roster).await?;
        Ok(members.into_iter().find(|m| m.name == name))
    }

    /// Registers a new member. Fails without touching storage if the trimmed
    /// name is blank or already taken.
    pub async fn add_member(&self, name: &str) -> AttendanceResult<Member> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AttendanceError::InvalidName(name.to_string()));
        }
        if self.find_by_name(name).await?.is_some() {
            warn!(roster = %self.roster, name, "Rejected duplicate member name");
            return Err(AttendanceError::DuplicateName(name.to_string()));
        }

        let member = Member::new(name);
        match self.repo.write_member(&self.roster, &member).await {
            Ok(()) => {}
            // A concurrent writer took the name after our lookup.
            Err(PortError::Conflict(_)) => {
                warn!(roster = %self.roster, name, "Member name taken by a concurrent write");
                return Err(AttendanceError::DuplicateName(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        info!(roster = %self.roster, member_id = %member.id, name, "Registered member");
        Ok(member)
    }

    /// Deletes a member that no session, however old, marks present.
    ///
    /// Returns the removed member, or `None` if the id was not on the roster.
    pub async fn remove_member(&self, id: Uuid) -> AttendanceResult<Option<Member>> {
        let member = self.find_by_id(id).await?;
        let sessions = self.repo.read_sessions(&self.roster).await?;
        if let Some(session) = sessions.values().find(|s| s.present_ids.contains(&id)) {
            let name = member
                .as_ref()
                .map(|m| m.name.clone())
                .unwrap_or_else(|| id.to_string());
            warn!(
                roster = %self.roster,
                member_id = %id,
                session = %session.key,
                "Refused to remove member with attendance records"
            );
            return Err(AttendanceError::MemberHasAttendance { id, name });
        }

        let Some(member) = member else {
            return Ok(None);
        };
        self.repo.delete_member(&self.roster, id).await?;
        info!(roster = %self.roster, member_id = %id, name = %member.name, "Removed member");
        Ok(Some(member))
    }
}

fn sort_by_name(members: &mut [Member]) {
    members.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PresenceSet, Session, SessionKey, Slot};
    use crate::memory::InMemoryRepository;
    use chrono::NaiveDate;

    fn store() -> (RosterStore, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let store = RosterStore::new(RosterId::new("수요반").unwrap(), repo.clone());
        (store, repo)
    }

    #[tokio::test]
    async fn add_member_trims_and_sorts() {
        let (store, _) = store();
        store.add_member(" 이영희 ").await.unwrap();
        store.add_member("김민수").await.unwrap();
        store.add_member("박지성").await.unwrap();

        let names: Vec<_> = store
            .members()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["김민수", "박지성", "이영희"]);
    }

    #[tokio::test]
    async fn duplicate_name_leaves_roster_unchanged() {
        let (store, _) = store();
        store.add_member("김민수").await.unwrap();

        let err = store.add_member("김민수 ").await.unwrap_err();
        assert!(matches!(err, AttendanceError::DuplicateName(ref n) if n == "김민수"));
        assert_eq!(store.members().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let (store, _) = store();
        assert!(matches!(
            store.add_member("  ").await,
            Err(AttendanceError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn lookups_return_none_when_absent() {
        let (store, _) = store();
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.find_by_name("없는사람").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removal_is_blocked_by_any_historical_session() {
        let (store, repo) = store();
        let member = store.add_member("김민수").await.unwrap();
        let old = SessionKey::new(NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(), Slot::Evening);
        let present: PresenceSet = [member.id].into_iter().collect();
        repo.write_session(store.roster_id(), &Session::new(old, present))
            .await
            .unwrap();

        let err = store.remove_member(member.id).await.unwrap_err();
        assert!(matches!(err, AttendanceError::MemberHasAttendance { ref name, .. } if name == "김민수"));
        assert!(store.find_by_id(member.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removing_unknown_member_is_a_no_op() {
        let (store, _) = store();
        assert!(store.remove_member(Uuid::new_v4()).await.unwrap().is_none());
    }
}
