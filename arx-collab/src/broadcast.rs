//! Fan-out of session events to participants.
//!
//! The engine talks to a [`Notifier`], called synchronously while the
//! session lock is held. That lock is what guarantees a participant never
//! sees operation N+1 before operation N.
//!
//! [`BroadcastHub`] is the in-process implementation: one tokio broadcast
//! channel per session, events encoded once and shared behind an `Arc`.
//! Each [`Subscription`] filters deliveries addressed to its own user.
//! A subscriber that falls more than `capacity` events behind gets
//! [`ProtocolError::Lagged`] once; the stream then resumes at the oldest
//! buffered event, and the caller is expected to catch up from the log
//! (`operations_since`) before trusting it again.

use arx_core::Operation;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::protocol::{CollabEvent, EventEnvelope, ProtocolError};

/// Outbound side of the engine. Implemented by the transport layer.
pub trait Notifier: Send + Sync {
    /// Deliver `event` to each user in `recipients`.
    fn notify(&self, session_id: Uuid, recipients: &[String], event: &CollabEvent);

    /// Called once per appended operation, before it is broadcast. Hook for
    /// durable storage of the log.
    fn operation_appended(&self, _session_id: Uuid, _operation: &Operation) {}

    /// Called after the final `SessionClosed` event. Nothing more will be
    /// sent for this session.
    fn session_closed(&self, _session_id: Uuid) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _session_id: Uuid, _recipients: &[String], _event: &CollabEvent) {}
}

/// One encoded event and who it is for.
#[derive(Debug)]
pub struct Delivery {
    pub recipients: Vec<String>,
    pub payload: Vec<u8>,
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_channels: usize,
}

/// Lock-free counters for the send path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Per-session broadcast channels.
pub struct BroadcastHub {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<Arc<Delivery>>>>,
    /// Deliveries buffered per subscriber before it starts lagging
    capacity: usize,
    stats: AtomicBroadcastStats,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            stats: AtomicBroadcastStats {
                messages_sent: AtomicU64::new(0),
                messages_dropped: AtomicU64::new(0),
            },
        }
    }

    /// Subscribe `user_id` to a session's events.
    ///
    /// Subscribing does not join the session; events only arrive once the
    /// engine lists the user as a recipient.
    pub fn subscribe(&self, session_id: Uuid, user_id: impl Into<String>) -> Subscription {
        // Fast path: read lock
        {
            let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
            if let Some(tx) = channels.get(&session_id) {
                return Subscription::new(session_id, user_id.into(), tx.subscribe());
            }
        }

        // Slow path: write lock, double-check
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Subscription::new(session_id, user_id.into(), tx.subscribe())
    }

    /// Drop a session's channel. Open subscriptions see `ChannelClosed`
    /// once they drain what was already sent.
    pub fn remove_session(&self, session_id: &Uuid) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels.remove(session_id).is_some()
    }

    pub fn stats(&self) -> BroadcastStats {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_channels: channels.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastHub {
    fn notify(&self, session_id: Uuid, recipients: &[String], event: &CollabEvent) {
        if recipients.is_empty() {
            return;
        }

        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = channels.get(&session_id) else {
            log::trace!("No subscribers for session {session_id}, dropping {}", event.name());
            return;
        };

        let payload = match EventEnvelope::new(session_id, event.clone()).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to encode {} for session {session_id}: {e}", event.name());
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let delivery = Arc::new(Delivery {
            recipients: recipients.to_vec(),
            payload,
        });
        match tx.send(delivery) {
            Ok(_) => {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => log::trace!("Nobody listening on session {session_id}, {} not sent", event.name()),
        }
    }

    fn session_closed(&self, session_id: Uuid) {
        if self.remove_session(&session_id) {
            log::debug!("Broadcast channel for session {session_id} removed");
        }
    }
}

/// One user's view of a session's event stream.
pub struct Subscription {
    session_id: Uuid,
    user_id: String,
    rx: broadcast::Receiver<Arc<Delivery>>,
}

impl Subscription {
    fn new(session_id: Uuid, user_id: String, rx: broadcast::Receiver<Arc<Delivery>>) -> Self {
        Self { session_id, user_id, rx }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Wait for the next event addressed to this user.
    ///
    /// `Err(Lagged(n))` means `n` deliveries were overwritten before this
    /// subscriber read them (not all of them necessarily addressed to it).
    /// The next call continues with what is still buffered.
    pub async fn recv(&mut self) -> Result<EventEnvelope, ProtocolError> {
        loop {
            match self.rx.recv().await {
                Ok(delivery) => {
                    if let Some(envelope) = self.accept(&delivery)? {
                        return Ok(envelope);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => return Err(self.lagged(n)),
                Err(broadcast::error::RecvError::Closed) => return Err(ProtocolError::ChannelClosed),
            }
        }
    }

    /// Next already-delivered event for this user, without waiting.
    pub fn try_recv(&mut self) -> Result<Option<EventEnvelope>, ProtocolError> {
        loop {
            match self.rx.try_recv() {
                Ok(delivery) => {
                    if let Some(envelope) = self.accept(&delivery)? {
                        return Ok(Some(envelope));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => return Err(self.lagged(n)),
                Err(broadcast::error::TryRecvError::Closed) => return Err(ProtocolError::ChannelClosed),
            }
        }
    }

    fn lagged(&self, n: u64) -> ProtocolError {
        log::warn!("Subscriber {} lagged by {n} events in session {}", self.user_id, self.session_id);
        ProtocolError::Lagged(n)
    }

    fn accept(&self, delivery: &Delivery) -> Result<Option<EventEnvelope>, ProtocolError> {
        if !delivery.recipients.iter().any(|r| r == &self.user_id) {
            return Ok(None);
        }
        EventEnvelope::decode(&delivery.payload).map(Some)
    }
}
