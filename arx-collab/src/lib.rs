//! # arx-collab: Multi-user editing sessions for Arx
//!
//! Turns the pure operation model of `arx-core` into a live service:
//! participants join a session, submit operations, and every other
//! participant sees the same ordered log.
//!
//! ## Architecture
//!
//! ```text
//!  caller ──► CollaborationEngine ──► SessionStore ──► CollaborationSession
//!                  │     │                                (Mutex per session)
//!                  │     └─► arx_core::transform
//!                  ▼
//!             Notifier ──► BroadcastHub ──► Subscription (per user)
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: session lifecycle, operation intake, presence, locks
//! - [`session`]: per-session state and the session registry
//! - [`presence`]: participant records, cursor and selection
//! - [`locks`]: short-lived element leases
//! - [`ratelimit`]: per-user, per-kind submission throttle
//! - [`broadcast`]: `Notifier` seam and the in-process fan-out hub
//! - [`protocol`]: event types and their bincode encoding
//! - [`metrics`]: engine-wide counters
//! - [`error`]: caller-facing errors

pub mod broadcast;
pub mod engine;
pub mod error;
pub mod locks;
pub mod metrics;
pub mod presence;
pub mod protocol;
pub mod ratelimit;
pub mod session;

// Re-exports for convenience
pub use broadcast::{BroadcastHub, BroadcastStats, Notifier, NullNotifier, Subscription};
pub use engine::{AppliedOperation, CollaborationEngine, EngineConfig, JoinAck, Submission};
pub use error::CollabError;
pub use locks::{ElementLocks, LockLease};
pub use metrics::{Metrics, MetricsSnapshot};
pub use presence::{PresenceUpdate, Role, UserSession, UserStatus};
pub use protocol::{CollabEvent, EventEnvelope, ProtocolError};
pub use ratelimit::{RateLimitConfig, RateLimiter, Throttled};
pub use session::{
    CollaborationSession, ConflictChoice, ConflictRecord, JoinOutcome, ManualDecision, SessionInfo,
    SessionStore, VersionRecord,
};
