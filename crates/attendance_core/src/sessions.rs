//! crates/attendance_core/src/sessions.rs
//!
//! The session store: attendance records of one roster keyed by (date, slot).
//! Writes here always overwrite; merge policy belongs to the reconciler.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{PresenceSet, RosterId, Session, SessionKey};
use crate::error::AttendanceResult;
use crate::ports::AttendanceRepository;

#[derive(Clone)]
pub struct SessionStore {
    roster: RosterId,
    repo: Arc<dyn AttendanceRepository>,
}

impl SessionStore {
    pub fn new(roster: RosterId, repo: Arc<dyn AttendanceRepository>) -> Self {
        Self { roster, repo }
    }

    pub fn roster_id(&self) -> &RosterId {
        &self.roster
    }

    /// Every session of the roster, ordered by date then slot.
    pub async fn sessions(&self) -> AttendanceResult<Vec<Session>> {
        let sessions = self.repo.read_sessions(&self.roster).await?;
        Ok(sessions.into_values().collect())
    }

    pub async fn session(&self, key: &SessionKey) -> AttendanceResult<Option<Session>> {
        Ok(self.repo.read_session(&self.roster, key).await?)
    }

    /// The present ids for the session; empty when it was never written.
    pub async fn get_presence(&self, key: &SessionKey) -> AttendanceResult<PresenceSet> {
        Ok(self
            .session(key)
            .await?
            .map(|s| s.present_ids)
            .unwrap_or_default())
    }

    /// Replaces the full presence set, creating the session if needed.
    pub async fn set_presence(
        &self,
        key: &SessionKey,
        ids: PresenceSet,
    ) -> AttendanceResult<Session> {
        let session = Session::new(*key, ids);
        self.repo.write_session(&self.roster, &session).await?;
        debug!(
            roster = %self.roster,
            session = %key,
            present = session.present_ids.len(),
            "Wrote session presence"
        );
        Ok(session)
    }

    /// Empties the session. Returns how many ids were cleared; an empty or
    /// missing session is left as it is.
    pub async fn reset_presence(&self, key: &SessionKey) -> AttendanceResult<usize> {
        let cleared = self.get_presence(key).await?.len();
        if cleared == 0 {
            return Ok(0);
        }
        self.set_presence(key, PresenceSet::new()).await?;
        info!(roster = %self.roster, session = %key, cleared, "Reset session presence");
        Ok(cleared)
    }
}
