//! Caller-facing error taxonomy. Every variant is recoverable.

use arx_core::{OperationError, OperationKind};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum CollabError {
    /// Unknown session id
    SessionNotFound(Uuid),
    /// User has not joined the session, or has left it
    NotAMember { session_id: Uuid, user_id: String },
    /// Join would exceed `max_participants` active users
    SessionFull { session_id: Uuid, max_participants: usize },
    /// Session was administratively closed
    SessionClosed(Uuid),
    /// Parameters malformed for the given kind
    InvalidOperation(OperationError),
    /// Viewers cannot submit operations
    ReadOnly { user_id: String },
    /// Unknown conflict id within the session
    ConflictNotFound(Uuid),
    /// Element leased to another participant
    ElementLocked { element: String, holder: String },
    /// Too many submissions of one kind inside the throttle window
    RateLimited { user_id: String, kind: OperationKind, retry_after_ms: u64 },
    /// Unknown version id within the session
    VersionNotFound(Uuid),
    /// Role does not allow the action
    PermissionDenied { user_id: String, action: &'static str },
    /// Conflict already carries a decision only the owner may replace
    ConflictAlreadyResolved(Uuid),
}

impl std::fmt::Display for CollabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "Session not found: {id}"),
            Self::NotAMember { session_id, user_id } => {
                write!(f, "User {user_id} is not a member of session {session_id}")
            }
            Self::SessionFull { session_id, max_participants } => {
                write!(f, "Session {session_id} is full ({max_participants} participants)")
            }
            Self::SessionClosed(id) => write!(f, "Session closed: {id}"),
            Self::InvalidOperation(e) => write!(f, "Invalid operation: {e}"),
            Self::ReadOnly { user_id } => write!(f, "User {user_id} has read-only access"),
            Self::ConflictNotFound(id) => write!(f, "Conflict not found: {id}"),
            Self::ElementLocked { element, holder } => {
                write!(f, "Element {element} is locked by {holder}")
            }
            Self::RateLimited { user_id, kind, retry_after_ms } => {
                write!(f, "User {user_id} is submitting {kind} too fast, retry in {retry_after_ms} ms")
            }
            Self::VersionNotFound(id) => write!(f, "Version not found: {id}"),
            Self::PermissionDenied { user_id, action } => {
                write!(f, "User {user_id} may not {action}")
            }
            Self::ConflictAlreadyResolved(id) => write!(f, "Conflict {id} is already resolved"),
        }
    }
}

impl std::error::Error for CollabError {}

impl From<OperationError> for CollabError {
    fn from(e: OperationError) -> Self {
        CollabError::InvalidOperation(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let id = Uuid::nil();
        assert_eq!(
            CollabError::SessionNotFound(id).to_string(),
            format!("Session not found: {id}")
        );
        assert_eq!(
            CollabError::ElementLocked { element: "wall-3".into(), holder: "bob".into() }.to_string(),
            "Element wall-3 is locked by bob"
        );
    }

    #[test]
    fn test_throttle_and_permission_messages() {
        let err = CollabError::RateLimited {
            user_id: "alice".into(),
            kind: OperationKind::Delete,
            retry_after_ms: 1_500,
        };
        assert_eq!(err.to_string(), "User alice is submitting delete too fast, retry in 1500 ms");
        let err = CollabError::PermissionDenied { user_id: "bob".into(), action: "join as owner" };
        assert_eq!(err.to_string(), "User bob may not join as owner");
    }

    #[test]
    fn test_operation_error_converts() {
        let err: CollabError =
            OperationError::MissingField { kind: OperationKind::Insert, field: "position" }.into();
        assert!(matches!(err, CollabError::InvalidOperation(_)));
        assert_eq!(err.to_string(), "Invalid operation: insert: missing field `position`");
    }
}
