//! Session store: the registry of live collaboration sessions.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, which is the only
//! critical section for sequence assignment and log append. The outer map is
//! read-locked on the hot path and write-locked only to insert, so sessions
//! never contend with one another.
//!
//! ```text
//! SessionStore
//!   └─ RwLock<HashMap<session_id, Arc<Mutex<CollaborationSession>>>>
//!          └─ users       (user_id → UserSession, never removed)
//!          └─ operations  (append-only, seq 1, 2, 3 …)
//!          └─ conflicts   (append-only ConflictRecord)
//!          └─ locks       (element leases)
//!          └─ versions    (named checkpoints over the log)
//! ```

use arx_core::{now_millis, Operation, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::CollabError;
use crate::locks::ElementLocks;
use crate::presence::{Role, UserSession};
use crate::ratelimit::RateLimiter;

/// Decision taken by a human on a recorded conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictChoice {
    LastWriteWins,
    Merge,
    Reject,
    UserChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualDecision {
    pub choice: ConflictChoice,
    pub resolved_by: String,
    pub resolved_at: u64,
}

/// An operation that had to be reconciled against an unseen predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub conflict_id: Uuid,
    /// The operation as appended (post-transform).
    pub operation_id: Uuid,
    pub conflicting_with_id: Uuid,
    pub target_element: String,
    pub resolution_kind: Resolution,
    pub created_at: u64,
    pub decision: Option<ManualDecision>,
}

impl ConflictRecord {
    pub fn needs_attention(&self) -> bool {
        self.resolution_kind == Resolution::Manual && self.decision.is_none()
    }
}

/// Named checkpoint: the log prefix up to and including `sequence_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version_id: Uuid,
    /// 1, 2, 3 … within the session.
    pub version_number: u64,
    pub parent_version: Option<Uuid>,
    /// Last operation included; 0 for a checkpoint of the empty log.
    pub sequence_number: u64,
    pub created_by: String,
    pub created_at: u64,
    pub description: String,
}

/// Read-only session summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub project_id: String,
    pub owner_user_id: String,
    pub created_at: u64,
    pub max_participants: usize,
    pub is_active: bool,
    pub participant_count: usize,
    pub operation_count: usize,
    pub conflict_count: usize,
    pub version_count: usize,
}

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// A previously left user came back.
    Rejoined,
    /// Already an active participant; nothing changed.
    AlreadyPresent,
}

/// One collaborative context scoped to a project.
#[derive(Debug)]
pub struct CollaborationSession {
    pub session_id: Uuid,
    pub project_id: String,
    pub owner_user_id: String,
    pub created_at: u64,
    pub max_participants: usize,
    pub is_active: bool,
    users: HashMap<String, UserSession>,
    operations: Vec<Operation>,
    conflicts: Vec<ConflictRecord>,
    versions: Vec<VersionRecord>,
    pub(crate) locks: ElementLocks,
    pub(crate) rate: RateLimiter,
}

impl CollaborationSession {
    /// `max_participants` is clamped to at least 1.
    pub fn new(project_id: impl Into<String>, owner_user_id: impl Into<String>, max_participants: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            project_id: project_id.into(),
            owner_user_id: owner_user_id.into(),
            created_at: now_millis(),
            max_participants: max_participants.max(1),
            is_active: true,
            users: HashMap::new(),
            operations: Vec::new(),
            conflicts: Vec::new(),
            versions: Vec::new(),
            locks: ElementLocks::new(),
            rate: RateLimiter::new(),
        }
    }

    pub fn ensure_open(&self) -> Result<(), CollabError> {
        if self.is_active {
            Ok(())
        } else {
            Err(CollabError::SessionClosed(self.session_id))
        }
    }

    pub fn active_user_count(&self) -> usize {
        self.users.values().filter(|u| u.is_active()).count()
    }

    pub fn user(&self, user_id: &str) -> Option<&UserSession> {
        self.users.get(user_id)
    }

    /// The active participant record, or `NotAMember`.
    pub fn member_mut(&mut self, user_id: &str) -> Result<&mut UserSession, CollabError> {
        let session_id = self.session_id;
        self.users
            .get_mut(user_id)
            .filter(|u| u.is_active())
            .ok_or_else(|| CollabError::NotAMember { session_id, user_id: user_id.to_string() })
    }

    pub fn join(
        &mut self,
        user_id: &str,
        display_name: &str,
        role: Role,
        now: u64,
    ) -> Result<JoinOutcome, CollabError> {
        self.ensure_open()?;
        if role == Role::Owner && user_id != self.owner_user_id {
            return Err(CollabError::PermissionDenied {
                user_id: user_id.to_string(),
                action: "join as owner",
            });
        }

        if let Some(existing) = self.users.get_mut(user_id) {
            if existing.is_active() {
                existing.touch(now);
                return Ok(JoinOutcome::AlreadyPresent);
            }
        }

        if self.active_user_count() >= self.max_participants {
            return Err(CollabError::SessionFull {
                session_id: self.session_id,
                max_participants: self.max_participants,
            });
        }

        match self.users.get_mut(user_id) {
            Some(previous) => {
                previous.rejoin(display_name, role, now);
                Ok(JoinOutcome::Rejoined)
            }
            None => {
                self.users
                    .insert(user_id.to_string(), UserSession::new(user_id, display_name, role, now));
                Ok(JoinOutcome::Joined)
            }
        }
    }

    /// Mark the user left and release their element leases.
    pub fn leave(&mut self, user_id: &str, now: u64) -> Result<Vec<String>, CollabError> {
        self.member_mut(user_id)?.leave(now);
        Ok(self.locks.release_all(user_id))
    }

    /// Mark every active user left and deactivate. Returns how many were active.
    pub fn close(&mut self, now: u64) -> usize {
        let mut evicted = 0;
        for user in self.users.values_mut().filter(|u| u.is_active()) {
            user.leave(now);
            evicted += 1;
        }
        self.is_active = false;
        evicted
    }

    /// Sequence number the next append will receive.
    pub fn next_sequence(&self) -> u64 {
        self.operations.len() as u64 + 1
    }

    pub fn last_operation(&self) -> Option<&Operation> {
        self.operations.last()
    }

    /// Assign the next sequence number and append. The log is never rewritten.
    pub fn append(&mut self, operation: Operation) -> &Operation {
        let seq = self.next_sequence();
        self.operations.push(operation.with_sequence(seq));
        &self.operations[self.operations.len() - 1]
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Log suffix strictly after `after_sequence`.
    pub fn operations_since(&self, after_sequence: u64) -> &[Operation] {
        let start = (after_sequence as usize).min(self.operations.len());
        &self.operations[start..]
    }

    pub fn record_conflict(&mut self, record: ConflictRecord) {
        self.conflicts.push(record);
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn conflict_mut(&mut self, conflict_id: Uuid) -> Result<&mut ConflictRecord, CollabError> {
        self.conflicts
            .iter_mut()
            .find(|c| c.conflict_id == conflict_id)
            .ok_or(CollabError::ConflictNotFound(conflict_id))
    }

    /// Checkpoint the log as it stands now.
    pub fn create_version(&mut self, created_by: &str, description: &str, now: u64) -> &VersionRecord {
        let record = VersionRecord {
            version_id: Uuid::new_v4(),
            version_number: self.versions.len() as u64 + 1,
            parent_version: self.versions.last().map(|v| v.version_id),
            sequence_number: self.operations.len() as u64,
            created_by: created_by.to_string(),
            created_at: now,
            description: description.to_string(),
        };
        self.versions.push(record);
        &self.versions[self.versions.len() - 1]
    }

    pub fn versions(&self) -> &[VersionRecord] {
        &self.versions
    }

    /// Operations captured by a checkpoint.
    pub fn version_operations(&self, version_id: Uuid) -> Result<&[Operation], CollabError> {
        let version = self
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .ok_or(CollabError::VersionNotFound(version_id))?;
        let end = (version.sequence_number as usize).min(self.operations.len());
        Ok(&self.operations[..end])
    }

    pub fn participants(&self) -> Vec<UserSession> {
        let mut users: Vec<UserSession> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.user_id.cmp(&b.user_id)));
        users
    }

    pub(crate) fn users_mut(&mut self) -> impl Iterator<Item = &mut UserSession> {
        self.users.values_mut()
    }

    /// Active participants other than `except`.
    pub fn recipients(&self, except: Option<&str>) -> Vec<String> {
        self.users
            .values()
            .filter(|u| u.is_active() && Some(u.user_id.as_str()) != except)
            .map(|u| u.user_id.clone())
            .collect()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            project_id: self.project_id.clone(),
            owner_user_id: self.owner_user_id.clone(),
            created_at: self.created_at,
            max_participants: self.max_participants,
            is_active: self.is_active,
            participant_count: self.active_user_count(),
            operation_count: self.operations.len(),
            conflict_count: self.conflicts.len(),
            version_count: self.versions.len(),
        }
    }
}

/// Owns every session. Injected into the engine; never global.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<CollaborationSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session and return its id.
    pub async fn insert(&self, session: CollaborationSession) -> Uuid {
        let id = session.session_id;
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Handle to a session's lock. The map lock is released before returning.
    pub async fn get(&self, session_id: &Uuid) -> Result<Arc<Mutex<CollaborationSession>>, CollabError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or(CollabError::SessionNotFound(*session_id))
    }

    pub async fn contains(&self, session_id: &Uuid) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Snapshot of session handles, for sweeps that visit every session.
    pub async fn handles(&self) -> Vec<Arc<Mutex<CollaborationSession>>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arx_core::{OperationParams, Point};

    fn session(max: usize) -> CollaborationSession {
        CollaborationSession::new("project-1", "owner", max)
    }

    fn insert_op(s: &CollaborationSession, user: &str) -> Operation {
        Operation::new(s.session_id, user, "e1", OperationParams::Insert { position: Point::ZERO })
    }

    #[test]
    fn test_new_session_is_active_and_empty() {
        let s = session(5);
        assert!(s.is_active);
        assert_eq!(s.active_user_count(), 0);
        assert_eq!(s.next_sequence(), 1);
        assert!(s.last_operation().is_none());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(session(0).max_participants, 1);
    }

    #[test]
    fn test_join_until_full() {
        let mut s = session(2);
        assert_eq!(s.join("a", "A", Role::Editor, 1).unwrap(), JoinOutcome::Joined);
        assert_eq!(s.join("b", "B", Role::Editor, 1).unwrap(), JoinOutcome::Joined);

        let err = s.join("c", "C", Role::Editor, 1).unwrap_err();
        assert!(matches!(err, CollabError::SessionFull { max_participants: 2, .. }));
        assert!(s.user("c").is_none());
        assert_eq!(s.active_user_count(), 2);
    }

    #[test]
    fn test_rejoin_while_present_is_noop_even_when_full() {
        let mut s = session(1);
        s.join("a", "A", Role::Editor, 1).unwrap();
        assert_eq!(s.join("a", "A", Role::Editor, 2).unwrap(), JoinOutcome::AlreadyPresent);
        assert_eq!(s.active_user_count(), 1);
    }

    #[test]
    fn test_leave_frees_slot_and_keeps_record() {
        let mut s = session(1);
        s.join("a", "A", Role::Editor, 1).unwrap();
        s.leave("a", 2).unwrap();
        assert_eq!(s.active_user_count(), 0);
        assert!(s.user("a").is_some());

        s.join("b", "B", Role::Editor, 3).unwrap();
        assert_eq!(s.participants().len(), 2);

        // a's slot is taken again
        assert!(matches!(s.join("a", "A", Role::Editor, 4), Err(CollabError::SessionFull { .. })));
    }

    #[test]
    fn test_leave_twice_is_not_a_member() {
        let mut s = session(2);
        s.join("a", "A", Role::Editor, 1).unwrap();
        s.leave("a", 2).unwrap();
        assert!(matches!(s.leave("a", 3), Err(CollabError::NotAMember { .. })));
    }

    #[test]
    fn test_append_assigns_gapless_sequence() {
        let mut s = session(2);
        for expected in 1..=5u64 {
            let op = insert_op(&s, "a");
            assert_eq!(s.append(op).sequence_number, expected);
        }
        let seqs: Vec<u64> = s.operations().iter().map(|o| o.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_operations_since() {
        let mut s = session(2);
        for _ in 0..4 {
            let op = insert_op(&s, "a");
            s.append(op);
        }
        assert_eq!(s.operations_since(0).len(), 4);
        assert_eq!(s.operations_since(2)[0].sequence_number, 3);
        assert!(s.operations_since(4).is_empty());
        assert!(s.operations_since(99).is_empty());
    }

    #[test]
    fn test_close_evicts_and_blocks_join() {
        let mut s = session(3);
        s.join("a", "A", Role::Editor, 1).unwrap();
        s.join("b", "B", Role::Viewer, 1).unwrap();
        assert_eq!(s.close(5), 2);
        assert!(!s.is_active);
        assert_eq!(s.active_user_count(), 0);
        assert!(matches!(s.join("c", "C", Role::Editor, 6), Err(CollabError::SessionClosed(_))));
    }

    #[test]
    fn test_recipients_exclude_sender_and_left_users() {
        let mut s = session(3);
        s.join("a", "A", Role::Editor, 1).unwrap();
        s.join("b", "B", Role::Editor, 1).unwrap();
        s.join("c", "C", Role::Editor, 1).unwrap();
        s.leave("c", 2).unwrap();

        assert_eq!(s.recipients(Some("a")), vec!["b".to_string()]);
        assert_eq!(s.recipients(None).len(), 2);
    }

    #[test]
    fn test_only_the_owner_joins_as_owner() {
        let mut s = session(3);
        let err = s.join("mallory", "M", Role::Owner, 1).unwrap_err();
        assert!(matches!(err, CollabError::PermissionDenied { .. }));
        assert!(s.user("mallory").is_none());

        assert_eq!(s.join("owner", "O", Role::Owner, 1).unwrap(), JoinOutcome::Joined);
    }

    #[test]
    fn test_versions_checkpoint_log_prefix() {
        let mut s = session(2);
        let empty = s.create_version("a", "blank", 1).clone();
        assert_eq!(empty.version_number, 1);
        assert_eq!(empty.sequence_number, 0);
        assert!(empty.parent_version.is_none());

        for _ in 0..3 {
            let op = insert_op(&s, "a");
            s.append(op);
        }
        let v2 = s.create_version("a", "three walls", 2).clone();
        assert_eq!(v2.sequence_number, 3);
        assert_eq!(v2.parent_version, Some(empty.version_id));

        let op = insert_op(&s, "a");
        s.append(op);

        assert_eq!(s.version_operations(v2.version_id).unwrap().len(), 3);
        assert!(s.version_operations(empty.version_id).unwrap().is_empty());
        assert!(matches!(s.version_operations(Uuid::new_v4()), Err(CollabError::VersionNotFound(_))));
        assert_eq!(s.info().version_count, 2);
    }

    #[test]
    fn test_conflict_lookup() {
        let mut s = session(2);
        let record = ConflictRecord {
            conflict_id: Uuid::new_v4(),
            operation_id: Uuid::new_v4(),
            conflicting_with_id: Uuid::new_v4(),
            target_element: "e1".into(),
            resolution_kind: Resolution::Manual,
            created_at: 1,
            decision: None,
        };
        let id = record.conflict_id;
        s.record_conflict(record);
        assert!(s.conflict_mut(id).unwrap().needs_attention());
        assert!(matches!(s.conflict_mut(Uuid::new_v4()), Err(CollabError::ConflictNotFound(_))));
    }

    #[tokio::test]
    async fn test_store_insert_and_get() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);

        let id = store.insert(session(4)).await;
        assert!(store.contains(&id).await);
        assert_eq!(store.len().await, 1);

        let handle = store.get(&id).await.unwrap();
        assert_eq!(handle.lock().await.max_participants, 4);

        assert!(matches!(store.get(&Uuid::new_v4()).await, Err(CollabError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_store_sessions_are_independent() {
        let store = SessionStore::new();
        let a = store.insert(session(2)).await;
        let b = store.insert(session(2)).await;

        let ha = store.get(&a).await.unwrap();
        let _guard = ha.lock().await;
        // b stays reachable while a is held
        let hb = store.get(&b).await.unwrap();
        assert!(hb.try_lock().is_ok());
        assert_eq!(store.session_ids().await.len(), 2);
    }
}
