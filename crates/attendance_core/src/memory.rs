//! crates/attendance_core/src/memory.rs
//!
//! An in-process implementation of the `AttendanceRepository` port. Writes are
//! immediately visible to reads and are fanned out to every live subscriber.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use uuid::Uuid;

use crate::domain::{Member, RosterChange, RosterId, Session, SessionKey};
use crate::ports::{AttendanceRepository, PortError, PortResult, RosterChangeStream};

#[derive(Default)]
struct RosterData {
    members: HashMap<Uuid, Member>,
    sessions: BTreeMap<SessionKey, Session>,
}

/// Rosters held in memory, keyed by their storage-safe key.
#[derive(Default)]
pub struct InMemoryRepository {
    rosters: RwLock<HashMap<String, RosterData>>,
    subscribers: Mutex<HashMap<String, Vec<UnboundedSender<RosterChange>>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> PortError {
        PortError::Unexpected("in-memory store lock poisoned".to_string())
    }

    fn notify(&self, roster: &RosterId, change: RosterChange) -> PortResult<()> {
        let mut subscribers = self.subscribers.lock().map_err(|_| Self::poisoned())?;
        if let Some(senders) = subscribers.get_mut(&roster.storage_key()) {
            // Dropped receivers are pruned here.
            senders.retain(|tx| tx.unbounded_send(change.clone()).is_ok());
        }
        Ok(())
    }
}

#[async_trait]
impl AttendanceRepository for InMemoryRepository {
    async fn read_members(&self, roster: &RosterId) -> PortResult<Vec<Member>> {
        let rosters = self.rosters.read().map_err(|_| Self::poisoned())?;
        Ok(rosters
            .get(&roster.storage_key())
            .map(|data| data.members.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn write_member(&self, roster: &RosterId, member: &Member) -> PortResult<()> {
        {
            let mut rosters = self.rosters.write().map_err(|_| Self::poisoned())?;
            rosters
                .entry(roster.storage_key())
                .or_default()
                .members
                .insert(member.id, member.clone());
        }
        self.notify(roster, RosterChange::MemberWritten { member_id: member.id })
    }

    async fn delete_member(&self, roster: &RosterId, member_id: Uuid) -> PortResult<()> {
        {
            let mut rosters = self.rosters.write().map_err(|_| Self::poisoned())?;
            if let Some(data) = rosters.get_mut(&roster.storage_key()) {
                data.members.remove(&member_id);
            }
        }
        self.notify(roster, RosterChange::MemberDeleted { member_id })
    }

    async fn read_sessions(&self, roster: &RosterId) -> PortResult<BTreeMap<SessionKey, Session>> {
        let rosters = self.rosters.read().map_err(|_| Self::poisoned())?;
        Ok(rosters
            .get(&roster.storage_key())
            .map(|data| data.sessions.clone())
            .unwrap_or_default())
    }

    async fn read_session(
        &self,
        roster: &RosterId,
        key: &SessionKey,
    ) -> PortResult<Option<Session>> {
        let rosters = self.rosters.read().map_err(|_| Self::poisoned())?;
        Ok(rosters
            .get(&roster.storage_key())
            .and_then(|data| data.sessions.get(key).cloned()))
    }

    async fn write_session(&self, roster: &RosterId, session: &Session) -> PortResult<()> {
        {
            let mut rosters = self.rosters.write().map_err(|_| Self::poisoned())?;
            rosters
                .entry(roster.storage_key())
                .or_default()
                .sessions
                .insert(session.key, session.clone());
        }
        self.notify(roster, RosterChange::SessionWritten { key: session.key })
    }

    async fn subscribe(&self, roster: &RosterId) -> PortResult<RosterChangeStream> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .map_err(|_| Self::poisoned())?
            .entry(roster.storage_key())
            .or_default()
            .push(tx);
        Ok(Box::pin(rx))
    }
}
