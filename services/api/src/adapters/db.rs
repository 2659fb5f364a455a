//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `AttendanceRepository` port for shared, multi-client deployments. It handles
//! all interactions with PostgreSQL using `sqlx`, and publishes every write through
//! `NOTIFY` so that other server instances can push live updates.

use std::collections::BTreeMap;

use async_trait::async_trait;
use attendance_core::{
    AttendanceRepository, Member, PortError, PortResult, PresenceSet, RosterChange,
    RosterChangeStream, RosterId, Session, SessionKey,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};
use uuid::Uuid;

/// The `LISTEN`/`NOTIFY` channel carrying roster changes.
const CHANGE_CHANNEL: &str = "attendance_changes";

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Maps a failed write, surfacing unique-constraint violations as conflicts.
fn write_error(e: sqlx::Error) -> PortError {
    match e.as_database_error() {
        Some(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            PortError::Conflict(db.message().to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `AttendanceRepository` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn notify(&self, payload: ChangePayload) -> PortResult<()> {
        let json = serde_json::to_string(&payload).map_err(|e| PortError::Unexpected(e.to_string()))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(json)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct MemberRecord {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}
impl MemberRecord {
    fn to_domain(self) -> Member {
        Member {
            id: self.id,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    date: NaiveDate,
    slot: String,
    present_ids: Vec<Uuid>,
    updated_at: DateTime<Utc>,
}
impl SessionRecord {
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

/// The JSON body of a change notification.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ChangePayload {
    MemberWritten { roster: String, member_id: Uuid },
    MemberDeleted { roster: String, member_id: Uuid },
    SessionWritten { roster: String, session_id: String },
}
impl ChangePayload {
    fn roster(&self) -> &str {
        match self {
            ChangePayload::MemberWritten { roster, .. }
            | ChangePayload::MemberDeleted { roster, .. }
            | ChangePayload::SessionWritten { roster, .. } => roster,
        }
    }

    fn to_domain(self) -> Option<RosterChange> {
        match self {
            ChangePayload::MemberWritten { member_id, .. } => {
                Some(RosterChange::MemberWritten { member_id })
            }
            ChangePayload::MemberDeleted { member_id, .. } => {
                Some(RosterChange::MemberDeleted { member_id })
            }
            ChangePayload::SessionWritten { session_id, .. } => session_id
                .parse::<SessionKey>()
                .ok()
                .map(|key| RosterChange::SessionWritten { key }),
        }
    }
}

//=========================================================================================
// `AttendanceRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl AttendanceRepository for DbAdapter {
    async fn read_members(&self, roster: &RosterId) -> PortResult<Vec<Member>> {
        let records = sqlx::query_as::<_, MemberRecord>(
            "SELECT id, name, created_at FROM members WHERE roster_key = $1",
        )
        .bind(roster.storage_key())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn write_member(&self, roster: &RosterId, member: &Member) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO members (roster_key, id, name, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (roster_key, id) DO UPDATE SET name = EXCLUDED.name",
        )
        .bind(roster.storage_key())
        .bind(member.id)
        .bind(&member.name)
        .bind(member.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        self.notify(ChangePayload::MemberWritten {
            roster: roster.storage_key(),
            member_id: member.id,
        })
        .await
    }

    async fn delete_member(&self, roster: &RosterId, member_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM members WHERE roster_key = $1 AND id = $2")
            .bind(roster.storage_key())
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.notify(ChangePayload::MemberDeleted {
            roster: roster.storage_key(),
            member_id,
        })
        .await
    }

    async fn read_sessions(&self, roster: &RosterId) -> PortResult<BTreeMap<SessionKey, Session>> {
        let records = sqlx::query_as::<_, SessionRecord>(
            "SELECT date, slot, present_ids, updated_at FROM sessions WHERE roster_key = $1",
        )
        .bind(roster.storage_key())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records
            .into_iter()
            .map(|r| r.to_domain().map(|s| (s.key, s)))
            .collect()
    }

    async fn read_session(
        &self,
        roster: &RosterId,
        key: &SessionKey,
    ) -> PortResult<Option<Session>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT date, slot, present_ids, updated_at FROM sessions
             WHERE roster_key = $1 AND session_id = $2",
        )
        .bind(roster.storage_key())
        .bind(key.id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        record.map(SessionRecord::to_domain).transpose()
    }

    async fn write_session(&self, roster: &RosterId, session: &Session) -> PortResult<()> {
        let present_ids: Vec<Uuid> = session.present_ids.iter().copied().collect();
        sqlx::query(
            "INSERT INTO sessions (roster_key, session_id, date, slot, present_ids, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (roster_key, session_id)
             DO UPDATE SET present_ids = EXCLUDED.present_ids, updated_at = EXCLUDED.updated_at",
        )
        .bind(roster.storage_key())
        .bind(session.id())
        .bind(session.key.date)
        .bind(session.key.slot.label())
        .bind(present_ids)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.notify(ChangePayload::SessionWritten {
            roster: roster.storage_key(),
            session_id: session.id(),
        })
        .await
    }

    async fn subscribe(&self, roster: &RosterId) -> PortResult<RosterChangeStream> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let roster_key = roster.storage_key();
        let stream = async_stream::stream! {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Change listener stopped: {}", e);
                        break;
                    }
                };
                let payload = match serde_json::from_str::<ChangePayload>(notification.payload()) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!("Ignoring malformed change payload: {}", e);
                        continue;
                    }
                };
                if payload.roster() != roster_key {
                    continue;
                }
                if let Some(change) = payload.to_domain() {
                    yield change;
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
