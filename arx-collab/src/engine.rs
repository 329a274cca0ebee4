//! Collaboration engine: session lifecycle, operation intake, transformation,
//! logging and fan-out.
//!
//! ```text
//! caller ──► apply_operation
//!               │  lock session (the only critical section)
//!               ├─ membership / role / element lease checks
//!               ├─ per-user, per-kind rate limit
//!               ├─ prior op on same target, by another user, unseen? ──► ot::transform
//!               ├─ append with next sequence number
//!               ├─ record conflict (if any)
//!               ├─ Notifier::operation_appended + notify other participants
//!               │  unlock
//!               └─ metrics
//! ```
//!
//! Sessions are fully independent: two sessions never share a lock.

use arx_core::{now_millis, transform, Operation, OperationKind, OperationParams, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::broadcast::{BroadcastHub, Notifier, NullNotifier};
use crate::error::CollabError;
use crate::locks::LockLease;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::presence::{PresenceUpdate, Role, UserSession, UserStatus};
use crate::protocol::CollabEvent;
use crate::ratelimit::RateLimitConfig;
use crate::session::{
    CollaborationSession, ConflictChoice, ConflictRecord, JoinOutcome, ManualDecision, SessionInfo,
    SessionStore, VersionRecord,
};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity for sessions created without an explicit limit
    pub default_max_participants: usize,
    /// Events buffered per subscriber (broadcast hub)
    pub broadcast_capacity: usize,
    /// Inactivity before a participant is shown as idle
    pub idle_timeout: Duration,
    /// Lease length for element locks
    pub lock_timeout: Duration,
    /// Period of the background idle sweep
    pub idle_sweep_interval: Duration,
    /// Submission throttle. `None` disables it.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_participants: 50,
            broadcast_capacity: 256,
            idle_timeout: Duration::from_secs(300),
            lock_timeout: Duration::from_secs(30),
            idle_sweep_interval: Duration::from_secs(30),
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

/// One edit submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub target_element: String,
    pub params: OperationParams,
    /// Highest sequence number the submitter had applied locally. `None`
    /// means unknown, and a prior operation by someone else is assumed
    /// unseen.
    pub seen_sequence: Option<u64>,
    pub metadata: BTreeMap<String, String>,
}

impl Submission {
    pub fn new(target_element: impl Into<String>, params: OperationParams) -> Self {
        Self {
            target_element: target_element.into(),
            params,
            seen_sequence: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn seen(mut self, sequence: u64) -> Self {
        self.seen_sequence = Some(sequence);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Acknowledgement of an appended operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOperation {
    pub operation_id: Uuid,
    pub sequence_number: u64,
    pub latency_ms: f64,
    /// How a same-target predecessor was handled, if there was one.
    pub resolution: Option<Resolution>,
    pub conflict_id: Option<Uuid>,
}

/// Acknowledgement of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAck {
    pub outcome: JoinOutcome,
    pub participant_count: usize,
}

pub struct CollaborationEngine {
    config: EngineConfig,
    store: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
}

impl CollaborationEngine {
    pub fn new(config: EngineConfig, store: Arc<SessionStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            store,
            notifier,
            metrics: Metrics::new(),
        }
    }

    /// Default configuration, fresh store, events discarded.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), Arc::new(SessionStore::new()), Arc::new(NullNotifier))
    }

    /// Fresh store wired to an in-process broadcast hub.
    pub fn with_broadcast(config: EngineConfig) -> (Self, Arc<BroadcastHub>) {
        let hub = Arc::new(BroadcastHub::new(config.broadcast_capacity));
        let engine = Self::new(config, Arc::new(SessionStore::new()), hub.clone());
        (engine, hub)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    // ── Session lifecycle ────────────────────────────────────────

    /// Open a session with the configured default capacity.
    pub async fn create_session(&self, project_id: impl Into<String>, owner_user_id: impl Into<String>) -> Uuid {
        self.create_session_with_capacity(project_id, owner_user_id, self.config.default_max_participants)
            .await
    }

    pub async fn create_session_with_capacity(
        &self,
        project_id: impl Into<String>,
        owner_user_id: impl Into<String>,
        max_participants: usize,
    ) -> Uuid {
        let session = CollaborationSession::new(project_id, owner_user_id, max_participants);
        log::info!(
            "Session {} created for project {} (owner {}, max {})",
            session.session_id,
            session.project_id,
            session.owner_user_id,
            session.max_participants
        );
        let id = self.store.insert(session).await;
        self.metrics.session_opened();
        id
    }

    pub async fn join_session(
        &self,
        session_id: Uuid,
        user_id: &str,
        display_name: &str,
        role: Role,
    ) -> Result<JoinAck, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;

        let outcome = match session.join(user_id, display_name, role, now_millis()) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Join of {user_id} to session {session_id} refused: {e}");
                return Err(e);
            }
        };
        let participant_count = session.active_user_count();

        if outcome != JoinOutcome::AlreadyPresent {
            self.metrics.users_joined(1);
            let recipients = session.recipients(Some(user_id));
            self.notifier.notify(
                session_id,
                &recipients,
                &CollabEvent::UserJoined {
                    user_id: user_id.to_string(),
                    display_name: display_name.to_string(),
                    role,
                },
            );
            log::info!(
                "User {display_name} ({user_id}) joined session {session_id} ({participant_count}/{})",
                session.max_participants
            );
        }

        Ok(JoinAck { outcome, participant_count })
    }

    pub async fn leave_session(&self, session_id: Uuid, user_id: &str) -> Result<(), CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;

        let freed = session.leave(user_id, now_millis())?;
        self.metrics.users_left(1);

        let recipients = session.recipients(Some(user_id));
        for element in freed {
            self.notifier.notify(
                session_id,
                &recipients,
                &CollabEvent::ElementUnlocked { element, user_id: user_id.to_string() },
            );
        }
        self.notifier.notify(
            session_id,
            &recipients,
            &CollabEvent::UserLeft { user_id: user_id.to_string() },
        );
        log::info!("User {user_id} left session {session_id}");
        Ok(())
    }

    /// Administrative close. Every participant is marked left; the logs stay
    /// readable.
    pub async fn close_session(&self, session_id: Uuid) -> Result<(), CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_open()?;

        let recipients = session.recipients(None);
        let evicted = session.close(now_millis());
        self.metrics.users_left(evicted as u64);
        self.metrics.session_closed();

        self.notifier.notify(session_id, &recipients, &CollabEvent::SessionClosed);
        self.notifier.session_closed(session_id);
        log::info!(
            "Session {session_id} closed ({evicted} participants evicted, {} operations logged)",
            session.operations().len()
        );
        Ok(())
    }

    // ── Operations ───────────────────────────────────────────────

    pub async fn apply_operation(
        &self,
        session_id: Uuid,
        user_id: &str,
        target_element: &str,
        params: OperationParams,
    ) -> Result<AppliedOperation, CollabError> {
        self.submit(session_id, user_id, Submission::new(target_element, params)).await
    }

    /// Entry point for callers holding an untyped kind and JSON parameters.
    pub async fn apply_json(
        &self,
        session_id: Uuid,
        user_id: &str,
        kind: &str,
        target_element: &str,
        parameters: serde_json::Value,
    ) -> Result<AppliedOperation, CollabError> {
        let kind: OperationKind = kind.parse()?;
        let params = OperationParams::from_json(kind, parameters)?;
        self.apply_operation(session_id, user_id, target_element, params).await
    }

    pub async fn submit(
        &self,
        session_id: Uuid,
        user_id: &str,
        submission: Submission,
    ) -> Result<AppliedOperation, CollabError> {
        let started = Instant::now();
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_open()?;

        let now = now_millis();
        let member = session.member_mut(user_id)?;
        if !member.role.can_edit() {
            log::warn!("Rejected {} from read-only user {user_id}", submission.params.kind());
            return Err(CollabError::ReadOnly { user_id: user_id.to_string() });
        }
        if let Some(lease) = session.locks.holder(&submission.target_element, now) {
            if lease.holder != user_id {
                return Err(CollabError::ElementLocked {
                    element: submission.target_element,
                    holder: lease.holder.clone(),
                });
            }
        }
        if let Some(limits) = &self.config.rate_limit {
            let kind = submission.params.kind();
            if let Err(throttled) = session.rate.check(user_id, kind, now, limits) {
                log::warn!(
                    "Throttled {kind} from {user_id} in session {session_id} (cap {} per {:?})",
                    throttled.limit,
                    limits.window
                );
                return Err(CollabError::RateLimited {
                    user_id: user_id.to_string(),
                    kind,
                    retry_after_ms: throttled.retry_after_ms,
                });
            }
        }

        let mut candidate = Operation::new(session_id, user_id, submission.target_element, submission.params);
        candidate.metadata = submission.metadata;

        let seen = submission.seen_sequence;
        let reconciled = session
            .last_operation()
            .filter(|prior| prior.target_element == candidate.target_element)
            // Nobody is concurrent with their own last edit
            .filter(|prior| prior.user_id != candidate.user_id)
            .filter(|prior| seen.map_or(true, |s| prior.sequence_number > s))
            .map(|prior| (prior.id, transform(&candidate, prior)));

        let (operation, conflict) = match reconciled {
            None => (candidate, None),
            Some((prior_id, outcome)) => {
                if outcome.is_transformed() {
                    self.metrics.record_conflict_resolved();
                }
                let resolution = outcome.resolution();
                log::debug!(
                    "{} on {} reconciled against {prior_id}: {:?}",
                    outcome.operation().kind(),
                    outcome.operation().target_element,
                    resolution
                );
                (outcome.into_operation(), resolution.map(|r| (prior_id, r)))
            }
        };

        let appended = session.append(operation).clone();

        let conflict_record = conflict.map(|(prior_id, resolution_kind)| ConflictRecord {
            conflict_id: Uuid::new_v4(),
            operation_id: appended.id,
            conflicting_with_id: prior_id,
            target_element: appended.target_element.clone(),
            resolution_kind,
            created_at: now,
            decision: None,
        });
        if let Some(record) = &conflict_record {
            session.record_conflict(record.clone());
        }

        let woke = session.member_mut(user_id)?.touch(now);
        let others = session.recipients(Some(user_id));
        if woke {
            self.notify_status(session_id, &others, user_id, UserStatus::Active);
        }

        self.notifier.operation_appended(session_id, &appended);
        self.notifier.notify(session_id, &others, &CollabEvent::OperationApplied(appended.clone()));

        if let Some(record) = conflict_record.as_ref().filter(|r| r.needs_attention()) {
            log::info!(
                "Conflict {} on {} in session {session_id} needs manual resolution",
                record.conflict_id,
                record.target_element
            );
            let everyone = session.recipients(None);
            self.notifier.notify(session_id, &everyone, &CollabEvent::ConflictRecorded(record.clone()));
        }
        drop(session);

        let latency = started.elapsed();
        self.metrics.record_operation(latency);

        Ok(AppliedOperation {
            operation_id: appended.id,
            sequence_number: appended.sequence_number,
            latency_ms: latency.as_secs_f64() * 1000.0,
            resolution: conflict_record.as_ref().map(|r| r.resolution_kind),
            conflict_id: conflict_record.map(|r| r.conflict_id),
        })
    }

    /// Log suffix strictly after `after_sequence`, for catch-up and audit.
    pub async fn operations_since(&self, session_id: Uuid, after_sequence: u64) -> Result<Vec<Operation>, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let session = handle.lock().await;
        Ok(session.operations_since(after_sequence).to_vec())
    }

    // ── Conflicts ────────────────────────────────────────────────

    pub async fn conflicts(&self, session_id: Uuid) -> Result<Vec<ConflictRecord>, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let session = handle.lock().await;
        Ok(session.conflicts().to_vec())
    }

    /// Record a human decision on a conflict. The log itself is untouched;
    /// any correction is submitted as a new operation.
    ///
    /// Viewers may not decide. Once decided, only a participant holding the
    /// owner role may change the decision.
    pub async fn resolve_conflict(
        &self,
        session_id: Uuid,
        conflict_id: Uuid,
        choice: ConflictChoice,
        resolved_by: &str,
    ) -> Result<ConflictRecord, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_open()?;

        let now = now_millis();
        let member = session.member_mut(resolved_by)?;
        if !member.role.can_edit() {
            return Err(CollabError::ReadOnly { user_id: resolved_by.to_string() });
        }
        let is_owner = member.role == Role::Owner;
        member.touch(now);

        let record = session.conflict_mut(conflict_id)?;
        if record.decision.is_some() && !is_owner {
            log::warn!("{resolved_by} tried to overwrite the decision on conflict {conflict_id}");
            return Err(CollabError::ConflictAlreadyResolved(conflict_id));
        }
        record.decision = Some(ManualDecision {
            choice,
            resolved_by: resolved_by.to_string(),
            resolved_at: now,
        });
        let record = record.clone();

        let everyone = session.recipients(None);
        self.notifier.notify(session_id, &everyone, &CollabEvent::ConflictResolved(record.clone()));
        log::info!("Conflict {conflict_id} resolved with {choice:?} by {resolved_by}");
        Ok(record)
    }

    // ── Versions ─────────────────────────────────────────────────

    /// Checkpoint the log as it stands. The version points at the current
    /// head sequence number and chains to the previous version.
    pub async fn create_version(
        &self,
        session_id: Uuid,
        created_by: &str,
        description: &str,
    ) -> Result<VersionRecord, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_open()?;

        let now = now_millis();
        let member = session.member_mut(created_by)?;
        if !member.role.can_edit() {
            return Err(CollabError::ReadOnly { user_id: created_by.to_string() });
        }
        member.touch(now);

        let version = session.create_version(created_by, description, now).clone();
        let others = session.recipients(Some(created_by));
        self.notifier.notify(session_id, &others, &CollabEvent::VersionCreated(version.clone()));
        log::info!(
            "Version {} of session {session_id} created by {created_by} at sequence {}",
            version.version_number,
            version.sequence_number
        );
        Ok(version)
    }

    /// Versions oldest first.
    pub async fn version_history(&self, session_id: Uuid) -> Result<Vec<VersionRecord>, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let session = handle.lock().await;
        Ok(session.versions().to_vec())
    }

    /// The log prefix a version covers.
    pub async fn version_operations(&self, session_id: Uuid, version_id: Uuid) -> Result<Vec<Operation>, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let session = handle.lock().await;
        Ok(session.version_operations(version_id)?.to_vec())
    }

    // ── Presence ─────────────────────────────────────────────────

    /// Apply a cursor/selection update and fan it out. Not logged.
    pub async fn update_presence(
        &self,
        session_id: Uuid,
        user_id: &str,
        update: PresenceUpdate,
    ) -> Result<(), CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_open()?;

        let member = session.member_mut(user_id)?;
        let woke = member.apply_presence(&update, now_millis());
        let event = CollabEvent::PresenceChanged {
            user_id: user_id.to_string(),
            selection: member.selection.iter().cloned().collect(),
            cursor: member.cursor,
        };

        let others = session.recipients(Some(user_id));
        if woke {
            self.notify_status(session_id, &others, user_id, UserStatus::Active);
        }
        log::trace!("Presence update from {user_id} in session {session_id}");
        self.notifier.notify(session_id, &others, &event);
        Ok(())
    }

    pub async fn heartbeat(&self, session_id: Uuid, user_id: &str) -> Result<(), CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_open()?;

        if session.member_mut(user_id)?.touch(now_millis()) {
            let others = session.recipients(Some(user_id));
            self.notify_status(session_id, &others, user_id, UserStatus::Active);
        }
        Ok(())
    }

    /// Mark participants idle after `idle_timeout` without activity.
    /// Expired element leases and empty throttle windows are dropped on the
    /// same pass. Returns how many participants changed.
    pub async fn sweep_idle(&self) -> usize {
        let now = now_millis();
        let timeout = millis(self.config.idle_timeout);
        let mut changed = 0;

        for handle in self.store.handles().await {
            let mut session = handle.lock().await;
            if !session.is_active {
                continue;
            }
            let session_id = session.session_id;
            let went_idle: Vec<String> = session
                .users_mut()
                .filter_map(|u| u.mark_idle_if_stale(now, timeout).then(|| u.user_id.clone()))
                .collect();

            for user_id in &went_idle {
                let others = session.recipients(Some(user_id));
                self.notify_status(session_id, &others, user_id, UserStatus::Idle);
            }
            changed += went_idle.len();

            let expired = session.locks.prune_expired(now);
            if !expired.is_empty() {
                let everyone = session.recipients(None);
                for lease in expired {
                    log::debug!("Lease on {} by {} expired in session {session_id}", lease.element, lease.holder);
                    self.notifier.notify(
                        session_id,
                        &everyone,
                        &CollabEvent::ElementUnlocked { element: lease.element, user_id: lease.holder },
                    );
                }
            }
            if let Some(limits) = &self.config.rate_limit {
                session.rate.prune(now, limits);
            }
        }

        if changed > 0 {
            log::debug!("Idle sweep marked {changed} participants idle");
        }
        changed
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every `idle_sweep_interval`
    /// until the engine is dropped.
    pub fn spawn_idle_monitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);
        let period = self.config.idle_sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    log::debug!("Engine dropped, idle monitor exiting");
                    break;
                };
                engine.sweep_idle().await;
            }
        })
    }

    pub async fn participants(&self, session_id: Uuid) -> Result<Vec<UserSession>, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let session = handle.lock().await;
        Ok(session.participants())
    }

    // ── Element locks ────────────────────────────────────────────

    pub async fn acquire_lock(&self, session_id: Uuid, user_id: &str, element: &str) -> Result<LockLease, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.ensure_open()?;

        let now = now_millis();
        session.member_mut(user_id)?.touch(now);
        let lease = session
            .locks
            .acquire(element, user_id, now, millis(self.config.lock_timeout))
            .map_err(|held| CollabError::ElementLocked { element: held.element, holder: held.holder })?;

        let others = session.recipients(Some(user_id));
        self.notifier.notify(session_id, &others, &CollabEvent::ElementLocked(lease.clone()));
        log::debug!("{user_id} locked {element} in session {session_id}");
        Ok(lease)
    }

    /// Returns false if `user_id` held no lease on `element`.
    pub async fn release_lock(&self, session_id: Uuid, user_id: &str, element: &str) -> Result<bool, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.member_mut(user_id)?;

        let released = session.locks.release(element, user_id);
        if released {
            let others = session.recipients(Some(user_id));
            self.notifier.notify(
                session_id,
                &others,
                &CollabEvent::ElementUnlocked { element: element.to_string(), user_id: user_id.to_string() },
            );
        }
        Ok(released)
    }

    // ── Introspection ────────────────────────────────────────────

    pub async fn get_session_info(&self, session_id: Uuid) -> Result<SessionInfo, CollabError> {
        let handle = self.store.get(&session_id).await?;
        let session = handle.lock().await;
        Ok(session.info())
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut infos = Vec::new();
        for handle in self.store.handles().await {
            infos.push(handle.lock().await.info());
        }
        infos.sort_by_key(|i| i.created_at);
        infos
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn notify_status(&self, session_id: Uuid, recipients: &[String], user_id: &str, status: UserStatus) {
        self.notifier.notify(
            session_id,
            recipients,
            &CollabEvent::StatusChanged { user_id: user_id.to_string(), status },
        );
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
