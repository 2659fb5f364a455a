//! services/api/src/adapters/file.rs
//!
//! The single-device storage adapter. All rosters live in one JSON document on
//! disk, rewritten after every change. Subscribers in the same process are
//! notified through a broadcast channel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use attendance_core::{
    AttendanceRepository, Member, PortError, PortResult, PresenceSet, RosterChange,
    RosterChangeStream, RosterId, Session, SessionKey,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

const CHANGE_BUFFER: usize = 256;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct JsonFileAdapter {
    path: PathBuf,
    data: Mutex<FileData>,
    changes: broadcast::Sender<(String, RosterChange)>,
}

impl JsonFileAdapter {
    /// Opens the data file, starting empty if it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> PortResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                PortError::Unexpected(format!("Corrupt data file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No data file at {}, starting empty", path.display());
                FileData::default()
            }
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self {
            path,
            data: Mutex::new(data),
            changes,
        })
    }

    /// Writes to a sibling temp file first so a crash never leaves half a document.
    async fn persist(&self, data: &FileData) -> PortResult<()> {
        let json = serde_json::to_string_pretty(data).map_err(|e| PortError::Unexpected(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    /// Applies `change` to a copy of the document and adopts the copy only once it
    /// is on disk, so a failed write leaves memory untouched.
    async fn commit(
        &self,
        roster: &RosterId,
        change: impl FnOnce(&mut RosterRecord) -> bool,
    ) -> PortResult<bool> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        if !change(next.rosters.entry(roster.storage_key()).or_default()) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *data = next;
        Ok(true)
    }

    fn publish(&self, roster: &RosterId, change: RosterChange) {
        // No receivers is not an error.
        let _ = self.changes.send((roster.storage_key(), change));
    }
}

//=========================================================================================
// On-Disk Record Structs
//=========================================================================================

#[derive(Clone, Default, Serialize, Deserialize)]
struct FileData {
    rosters: BTreeMap<String, RosterRecord>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct RosterRecord {
    members: BTreeMap<Uuid, MemberRecord>,
    sessions: BTreeMap<String, SessionRecord>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRecord {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}
impl MemberRecord {
    fn from_domain(member: &Member) -> Self {
        Self {
            id: member.id,
            name: member.name.clone(),
            created_at: member.created_at,
        }
    }

    fn to_domain(self) -> Member {
        Member {
            id: self.id,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    id: String,
    date: NaiveDate,
    slot: String,
    present_ids: Vec<Uuid>,
    updated_at: DateTime<Utc>,
}
impl SessionRecord {
    fn from_domain(session: &Session) -> Self {
        Self {
            id: session.id(),
            date: session.key.date,
            slot: session.key.slot.label().to_string(),
            present_ids: session.present_ids.iter().copied().collect(),
            updated_at: session.updated_at,
        }
    }

    fn to_domain(self) -> PortResult<Session> {
        let slot = self
            .slot
            .parse()
            .map_err(|_| PortError::Unexpected(format!("Stored slot '{}' is invalid", self.slot)))?;
        Ok(Session {
            key: SessionKey::new(self.date, slot),
            present_ids: self.present_ids.into_iter().collect::<PresenceSet>(),
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// `AttendanceRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl AttendanceRepository for JsonFileAdapter {
    async fn read_members(&self, roster: &RosterId) -> PortResult<Vec<Member>> {
        let data = self.data.lock().await;
        Ok(data
            .rosters
            .get(&roster.storage_key())
            .map(|r| r.members.values().cloned().map(MemberRecord::to_domain).collect())
            .unwrap_or_default())
    }

    async fn write_member(&self, roster: &RosterId, member: &Member) -> PortResult<()> {
        self.commit(roster, |record| {
            record
                .members
                .insert(member.id, MemberRecord::from_domain(member));
            true
        })
        .await?;
        self.publish(roster, RosterChange::MemberWritten { member_id: member.id });
        Ok(())
    }

    async fn delete_member(&self, roster: &RosterId, member_id: Uuid) -> PortResult<()> {
        self.commit(roster, |record| record.members.remove(&member_id).is_some())
            .await?;
        self.publish(roster, RosterChange::MemberDeleted { member_id });
        Ok(())
    }

    async fn read_sessions(&self, roster: &RosterId) -> PortResult<BTreeMap<SessionKey, Session>> {
        let data = self.data.lock().await;
        let Some(record) = data.rosters.get(&roster.storage_key()) else {
            return Ok(BTreeMap::new());
        };
        record
            .sessions
            .values()
            .cloned()
            .map(|r| r.to_domain().map(|s| (s.key, s)))
            .collect()
    }

    async fn read_session(
        &self,
        roster: &RosterId,
        key: &SessionKey,
    ) -> PortResult<Option<Session>> {
        let data = self.data.lock().await;
        data.rosters
            .get(&roster.storage_key())
            .and_then(|r| r.sessions.get(&key.id()).cloned())
            .map(SessionRecord::to_domain)
            .transpose()
    }

    async fn write_session(&self, roster: &RosterId, session: &Session) -> PortResult<()> {
        self.commit(roster, |record| {
            record
                .sessions
                .insert(session.id(), SessionRecord::from_domain(session));
            true
        })
        .await?;
        self.publish(roster, RosterChange::SessionWritten { key: session.key });
        Ok(())
    }

    async fn subscribe(&self, roster: &RosterId) -> PortResult<RosterChangeStream> {
        let receiver = self.changes.subscribe();
        let roster_key = roster.storage_key();
        let changes = stream::unfold(receiver, move |mut receiver| {
            let roster_key = roster_key.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok((key, change)) if key == roster_key => return Some((change, receiver)),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Subscriber fell behind; some changes were dropped");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(changes))
    }
}
