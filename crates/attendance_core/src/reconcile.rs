//! crates/attendance_core/src/reconcile.rs
//!
//! The reconciliation service. Turns pasted text, self-service check-ins and admin
//! toggles into member registrations and session presence writes.
//!
//! Every read-modify-write re-reads the session through the repository right before
//! computing the new set, so an update pushed by another client since the last read
//! is merged rather than lost.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Member, PresenceSet, RosterId, SessionKey, Slot};
use crate::error::{AttendanceError, AttendanceResult};
use crate::extractor::{extract_names, normalize};
use crate::ports::{AttendanceRepository, Clock};
use crate::roster::RosterStore;
use crate::sessions::SessionStore;

/// Minimum length, in characters, of a self-registered name.
pub const MIN_SELF_REGISTERED_NAME: usize = 2;

//=========================================================================================
// Outcomes
//=========================================================================================

/// What a bulk ingestion pass changed.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub key: SessionKey,
    /// Members created by this pass, in the order their names first appear.
    pub registered: Vec<Member>,
    /// Roster members whose name occurs in the text.
    pub matched: usize,
    /// Matched members that were not already present.
    pub newly_present: usize,
    /// Size of the session's presence set after the write.
    pub present_total: usize,
}

/// The result of a self-service check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    CheckedIn { member: Member, key: SessionKey },
    /// The member was already present. Nothing was written; the caller should ask
    /// whether to cancel and, if confirmed, call [`Reconciler::cancel_check_in`].
    AlreadyPresent { member: Member, key: SessionKey },
}

//=========================================================================================
// The Service
//=========================================================================================

/// Reconciliation operations bound to one roster.
#[derive(Clone)]
pub struct Reconciler {
    roster: RosterStore,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(roster: RosterId, repo: Arc<dyn AttendanceRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            roster: RosterStore::new(roster.clone(), repo.clone()),
            sessions: SessionStore::new(roster, repo),
            clock,
        }
    }

    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The session key for the current local date and the given slot.
    pub fn today(&self, slot: Slot) -> SessionKey {
        SessionKey::new(self.clock.today(), slot)
    }

    /// Registers unknown names found in `text` and merges every roster member whose
    /// name occurs in it into the session. Presence never shrinks here.
    pub async fn ingest(&self, text: &str, key: &SessionKey) -> AttendanceResult<IngestReport> {
        if text.trim().is_empty() {
            return Err(AttendanceError::EmptyInput);
        }

        let mut members = self.roster.members().await?;
        let mut registered = Vec::new();
        for name in extract_names(text) {
            if members.iter().any(|m| m.name == name) {
                continue;
            }
            match self.roster.add_member(&name).await {
                Ok(member) => {
                    members.push(member.clone());
                    registered.push(member);
                }
                // Another writer registered it between our read and this call.
                Err(AttendanceError::DuplicateName(_)) => {
                    if let Some(member) = self.roster.find_by_name(&name).await? {
                        members.push(member);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        // Containment is tested against every known name, not just the extracted
        // tokens, so names glued to other text still match.
        let normalized = normalize(text);
        let matched: PresenceSet = members
            .iter()
            .filter(|m| normalized.contains(m.name.as_str()))
            .map(|m| m.id)
            .collect();

        let existing = self.sessions.get_presence(key).await?;
        let newly_present = matched.difference(&existing).len();
        // Nobody matched: leave the session alone so no empty session is created.
        let present_total = if matched.is_empty() {
            existing.len()
        } else {
            let merged = existing.union(&matched);
            self.sessions.set_presence(key, merged).await?.present_ids.len()
        };

        info!(
            roster = %self.roster.roster_id(),
            session = %key,
            registered = registered.len(),
            matched = matched.len(),
            newly_present,
            "Ingested roster text"
        );

        Ok(IngestReport {
            key: *key,
            registered,
            matched: matched.len(),
            newly_present,
            present_total,
        })
    }

    /// Marks a member present for today's session of `slot`.
    pub async fn self_check_in(&self, member_id: Uuid, slot: Slot) -> AttendanceResult<CheckInOutcome> {
        let member = self
            .roster
            .find_by_id(member_id)
            .await?
            .ok_or(AttendanceError::UnknownMember(member_id))?;
        let key = self.today(slot);

        let mut presence = self.sessions.get_presence(&key).await?;
        if !presence.insert(member_id) {
            info!(roster = %self.roster.roster_id(), session = %key, member_id = %member_id, "Member already checked in");
            return Ok(CheckInOutcome::AlreadyPresent { member, key });
        }
        self.sessions.set_presence(&key, presence).await?;
        info!(roster = %self.roster.roster_id(), session = %key, member_id = %member_id, "Member checked in");
        Ok(CheckInOutcome::CheckedIn { member, key })
    }

    /// Removes a confirmed cancellation from today's session of `slot`.
    /// Returns whether the member had been present.
    pub async fn cancel_check_in(&self, member_id: Uuid, slot: Slot) -> AttendanceResult<bool> {
        let key = self.today(slot);
        let mut presence = self.sessions.get_presence(&key).await?;
        if !presence.remove(&member_id) {
            return Ok(false);
        }
        self.sessions.set_presence(&key, presence).await?;
        info!(roster = %self.roster.roster_id(), session = %key, member_id = %member_id, "Check-in cancelled");
        Ok(true)
    }

    /// Registers a newcomer from the self-service view and checks them in for
    /// today's session of `slot`.
    pub async fn self_register(&self, name: &str, slot: Slot) -> AttendanceResult<CheckInOutcome> {
        let name = name.trim();
        if name.chars().count() < MIN_SELF_REGISTERED_NAME {
            warn!(roster = %self.roster.roster_id(), name, "Rejected self-registration name");
            return Err(AttendanceError::InvalidName(name.to_string()));
        }
        let member = self.roster.add_member(name).await?;
        self.self_check_in(member.id, slot).await
    }

    /// Admin grid toggle. Returns `true` if the member is present afterwards.
    ///
    /// Removing works for any id, so dangling ids can be cleared; adding requires
    /// the member to be on the roster.
    pub async fn toggle_presence(&self, member_id: Uuid, key: &SessionKey) -> AttendanceResult<bool> {
        let mut presence = self.sessions.get_presence(key).await?;
        let now_present = if presence.remove(&member_id) {
            false
        } else {
            if self.roster.find_by_id(member_id).await?.is_none() {
                return Err(AttendanceError::UnknownMember(member_id));
            }
            presence.insert(member_id);
            true
        };
        self.sessions.set_presence(key, presence).await?;
        info!(roster = %self.roster.roster_id(), session = %key, member_id = %member_id, now_present, "Toggled presence");
        Ok(now_present)
    }
}
