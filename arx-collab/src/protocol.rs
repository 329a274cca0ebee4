//! Events emitted to session participants, and their binary encoding.
//!
//! Wire format (bincode, `config::standard()`):
//! ```text
//! ┌────────────┬────────────┬──────────────────────┐
//! │ session_id │ emitted_at │ event (tagged union) │
//! │ 16 bytes   │ varint     │ variable             │
//! └────────────┴────────────┴──────────────────────┘
//! ```
//!
//! Framing and delivery (WebSocket, HTTP, …) belong to the transport.

use arx_core::{now_millis, Operation, Point};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::locks::LockLease;
use crate::presence::{Role, UserStatus};
use crate::session::{ConflictRecord, VersionRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollabEvent {
    UserJoined {
        user_id: String,
        display_name: String,
        role: Role,
    },
    UserLeft {
        user_id: String,
    },
    /// Active ⇄ idle transitions.
    StatusChanged {
        user_id: String,
        status: UserStatus,
    },
    /// A (possibly transformed) operation was appended to the log.
    OperationApplied(Operation),
    /// Ephemeral cursor/selection state; never logged.
    PresenceChanged {
        user_id: String,
        selection: Vec<String>,
        cursor: Option<Point>,
    },
    /// A conflict that needs a human decision.
    ConflictRecorded(ConflictRecord),
    ConflictResolved(ConflictRecord),
    ElementLocked(LockLease),
    ElementUnlocked {
        element: String,
        user_id: String,
    },
    VersionCreated(VersionRecord),
    SessionClosed,
}

impl CollabEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            CollabEvent::UserJoined { .. } => "user_joined",
            CollabEvent::UserLeft { .. } => "user_left",
            CollabEvent::StatusChanged { .. } => "status_changed",
            CollabEvent::OperationApplied(_) => "operation_applied",
            CollabEvent::PresenceChanged { .. } => "presence_changed",
            CollabEvent::ConflictRecorded(_) => "conflict_recorded",
            CollabEvent::ConflictResolved(_) => "conflict_resolved",
            CollabEvent::ElementLocked(_) => "element_locked",
            CollabEvent::ElementUnlocked { .. } => "element_unlocked",
            CollabEvent::VersionCreated(_) => "version_created",
            CollabEvent::SessionClosed => "session_closed",
        }
    }
}

/// An event addressed to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub session_id: Uuid,
    /// Milliseconds since the Unix epoch.
    pub emitted_at: u64,
    pub event: CollabEvent,
}

impl EventEnvelope {
    pub fn new(session_id: Uuid, event: CollabEvent) -> Self {
        Self {
            session_id,
            emitted_at: now_millis(),
            event,
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (envelope, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(envelope)
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    ChannelClosed,
    /// Deliveries lost to a slow subscriber; resync from the log.
    Lagged(u64),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::ChannelClosed => write!(f, "Event channel closed"),
            Self::Lagged(n) => write!(f, "Subscriber lagged, {n} events missed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
