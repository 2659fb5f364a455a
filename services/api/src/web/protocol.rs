//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket messages the server pushes to subscribed clients when a
//! roster changes. Clients re-fetch the affected resources over REST.

use attendance_core::RosterChange;
use serde::Serialize;
use uuid::Uuid;

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the subscription; sent once after the upgrade.
    Subscribed { roster_id: String },

    /// A member was registered or renamed.
    MemberWritten { member_id: Uuid },

    /// A member was removed from the roster.
    MemberDeleted { member_id: Uuid },

    /// A session's presence set was written.
    SessionWritten {
        session_id: String,
        date: String,
        slot: String,
    },

    /// Reports a fatal error to the client before the connection closes.
    Error { message: String },
}

impl From<RosterChange> for ServerMessage {
    fn from(change: RosterChange) -> Self {
        match change {
            RosterChange::MemberWritten { member_id } => ServerMessage::MemberWritten { member_id },
            RosterChange::MemberDeleted { member_id } => ServerMessage::MemberDeleted { member_id },
            RosterChange::SessionWritten { key } => ServerMessage::SessionWritten {
                session_id: key.id(),
                date: key.date.format("%Y-%m-%d").to_string(),
                slot: key.slot.label().to_string(),
            },
        }
    }
}
