//! Per-participant presence: activity status, selection and cursor.
//!
//! Presence is ephemeral. Updates are fanned out to the other participants
//! but never written to the operation log.
//!
//! ```text
//!  join ──► Active ◄──── any activity ────┐
//!             │                           │
//!             └── idle_timeout elapsed ──► Idle
//!             │                           │
//!             └────────── leave ──────────┴──► Left
//! ```
//!
//! A `Left` record is kept for the lifetime of the session so that logged
//! operations and conflicts stay attributable. Rejoining revives it.

use arx_core::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Participant role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Editor,
    /// May watch and publish presence, but not edit.
    Viewer,
}

impl Role {
    pub fn can_edit(&self) -> bool {
        !matches!(self, Role::Viewer)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Editor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Idle,
    Left,
}

/// Lightweight presence message, distinct from document operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresenceUpdate {
    Cursor { position: Point },
    ClearCursor,
    /// Replaces the whole selection.
    Selection { element_ids: Vec<String> },
}

/// One participant's record inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    /// Milliseconds since the Unix epoch.
    pub joined_at: u64,
    pub last_activity_at: u64,
    pub selection: BTreeSet<String>,
    pub cursor: Option<Point>,
    pub status: UserStatus,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: Role, now: u64) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
            joined_at: now,
            last_activity_at: now,
            selection: BTreeSet::new(),
            cursor: None,
            status: UserStatus::Active,
        }
    }

    /// Counted against `max_participants` (active or idle).
    pub fn is_active(&self) -> bool {
        self.status != UserStatus::Left
    }

    /// Record activity. Returns true if this woke the user from idle.
    pub fn touch(&mut self, now: u64) -> bool {
        self.last_activity_at = self.last_activity_at.max(now);
        if self.status == UserStatus::Idle {
            self.status = UserStatus::Active;
            return true;
        }
        false
    }

    /// Apply a presence update. Returns true if this woke the user from idle.
    pub fn apply_presence(&mut self, update: &PresenceUpdate, now: u64) -> bool {
        match update {
            PresenceUpdate::Cursor { position } => self.cursor = Some(*position),
            PresenceUpdate::ClearCursor => self.cursor = None,
            PresenceUpdate::Selection { element_ids } => {
                self.selection = element_ids.iter().cloned().collect();
            }
        }
        self.touch(now)
    }

    /// Move an active user to idle once `idle_timeout_ms` has passed
    /// without activity. Returns whether the status changed.
    pub fn mark_idle_if_stale(&mut self, now: u64, idle_timeout_ms: u64) -> bool {
        if self.status == UserStatus::Active
            && now.saturating_sub(self.last_activity_at) >= idle_timeout_ms
        {
            self.status = UserStatus::Idle;
            return true;
        }
        false
    }

    /// Mark as left. Presence is cleared; the record itself stays.
    pub fn leave(&mut self, now: u64) {
        self.status = UserStatus::Left;
        self.last_activity_at = self.last_activity_at.max(now);
        self.selection.clear();
        self.cursor = None;
    }

    /// Bring a left user back with fresh profile data.
    pub fn rejoin(&mut self, display_name: impl Into<String>, role: Role, now: u64) {
        self.display_name = display_name.into();
        self.role = role;
        self.status = UserStatus::Active;
        self.last_activity_at = self.last_activity_at.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserSession {
        UserSession::new("alice", "Alice", Role::Editor, 1_000)
    }

    #[test]
    fn test_new_user_is_active() {
        let u = alice();
        assert_eq!(u.status, UserStatus::Active);
        assert!(u.is_active());
        assert!(u.selection.is_empty());
        assert!(u.cursor.is_none());
    }

    #[test]
    fn test_cursor_and_selection_updates() {
        let mut u = alice();
        u.apply_presence(&PresenceUpdate::Cursor { position: Point::new(4.0, 2.0) }, 2_000);
        assert_eq!(u.cursor, Some(Point::new(4.0, 2.0)));
        assert_eq!(u.last_activity_at, 2_000);

        u.apply_presence(
            &PresenceUpdate::Selection { element_ids: vec!["b".into(), "a".into(), "a".into()] },
            2_500,
        );
        assert_eq!(u.selection.len(), 2);
        assert!(u.selection.contains("a"));

        u.apply_presence(&PresenceUpdate::ClearCursor, 3_000);
        assert!(u.cursor.is_none());
    }

    #[test]
    fn test_idle_then_wake() {
        let mut u = alice();
        assert!(!u.mark_idle_if_stale(5_000, 300_000));
        assert!(u.mark_idle_if_stale(301_000, 300_000));
        assert_eq!(u.status, UserStatus::Idle);
        assert!(u.is_active());

        // already idle: no further change
        assert!(!u.mark_idle_if_stale(400_000, 300_000));

        assert!(u.touch(400_001));
        assert_eq!(u.status, UserStatus::Active);
    }

    #[test]
    fn test_leave_keeps_record_and_clears_presence() {
        let mut u = alice();
        u.apply_presence(&PresenceUpdate::Cursor { position: Point::ZERO }, 1_500);
        u.leave(2_000);
        assert_eq!(u.status, UserStatus::Left);
        assert!(!u.is_active());
        assert!(u.cursor.is_none());
        assert_eq!(u.last_activity_at, 2_000);

        // a left user never goes idle
        assert!(!u.mark_idle_if_stale(10_000_000, 1));
    }

    #[test]
    fn test_rejoin_restores_activity() {
        let mut u = alice();
        u.leave(2_000);
        u.rejoin("Alice B.", Role::Viewer, 3_000);
        assert_eq!(u.status, UserStatus::Active);
        assert_eq!(u.display_name, "Alice B.");
        assert_eq!(u.role, Role::Viewer);
        assert_eq!(u.joined_at, 1_000);
    }

    #[test]
    fn test_viewer_cannot_edit() {
        assert!(Role::Owner.can_edit());
        assert!(Role::Editor.can_edit());
        assert!(!Role::Viewer.can_edit());
        assert_eq!(Role::default(), Role::Editor);
    }
}
