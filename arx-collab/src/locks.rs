//! Advisory element leases.
//!
//! A participant may lease an element for `lock_timeout`; while the lease is
//! live, operations on that element from anyone else are refused. Expired
//! leases are treated as absent; they are dropped on the next acquire or
//! idle sweep.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A live lease on one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLease {
    pub element: String,
    pub holder: String,
    /// Milliseconds since the Unix epoch.
    pub expires_at: u64,
}

impl LockLease {
    pub fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Lease table for one session.
#[derive(Debug, Default)]
pub struct ElementLocks {
    leases: HashMap<String, LockLease>,
}

impl ElementLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take or renew a lease. Returns the other holder's lease on refusal.
    pub fn acquire(
        &mut self,
        element: &str,
        user_id: &str,
        now: u64,
        ttl_ms: u64,
    ) -> Result<LockLease, LockLease> {
        self.prune_expired(now);
        if let Some(existing) = self.leases.get(element) {
            if existing.holder != user_id {
                return Err(existing.clone());
            }
        }
        let lease = LockLease {
            element: element.to_string(),
            holder: user_id.to_string(),
            expires_at: now.saturating_add(ttl_ms),
        };
        self.leases.insert(element.to_string(), lease.clone());
        Ok(lease)
    }

    /// Drop a lease held by `user_id`. Returns whether one was removed.
    pub fn release(&mut self, element: &str, user_id: &str) -> bool {
        match self.leases.get(element) {
            Some(lease) if lease.holder == user_id => {
                self.leases.remove(element);
                true
            }
            _ => false,
        }
    }

    /// Drop every lease held by `user_id`, returning the freed elements.
    pub fn release_all(&mut self, user_id: &str) -> Vec<String> {
        let freed: Vec<String> = self
            .leases
            .values()
            .filter(|l| l.holder == user_id)
            .map(|l| l.element.clone())
            .collect();
        for element in &freed {
            self.leases.remove(element);
        }
        freed
    }

    /// Live lease on `element`, if any.
    pub fn holder(&self, element: &str, now: u64) -> Option<&LockLease> {
        self.leases.get(element).filter(|l| l.is_live(now))
    }

    pub fn live_count(&self, now: u64) -> usize {
        self.leases.values().filter(|l| l.is_live(now)).count()
    }

    /// Forget expired leases. Returns them so the release can be announced.
    pub fn prune_expired(&mut self, now: u64) -> Vec<LockLease> {
        let expired: Vec<String> = self
            .leases
            .values()
            .filter(|l| !l.is_live(now))
            .map(|l| l.element.clone())
            .collect();
        expired.iter().filter_map(|e| self.leases.remove(e)).collect()
    }

    /// Entries held, expired or not.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_refuse_other_user() {
        let mut locks = ElementLocks::new();
        let lease = locks.acquire("door-1", "alice", 1_000, 30_000).unwrap();
        assert_eq!(lease.expires_at, 31_000);

        let refused = locks.acquire("door-1", "bob", 2_000, 30_000).unwrap_err();
        assert_eq!(refused.holder, "alice");
    }

    #[test]
    fn test_holder_can_renew() {
        let mut locks = ElementLocks::new();
        locks.acquire("door-1", "alice", 1_000, 30_000).unwrap();
        let renewed = locks.acquire("door-1", "alice", 20_000, 30_000).unwrap();
        assert_eq!(renewed.expires_at, 50_000);
    }

    #[test]
    fn test_expired_lease_can_be_taken() {
        let mut locks = ElementLocks::new();
        locks.acquire("door-1", "alice", 1_000, 30_000).unwrap();
        assert!(locks.holder("door-1", 31_000).is_none());

        let lease = locks.acquire("door-1", "bob", 31_000, 30_000).unwrap();
        assert_eq!(lease.holder, "bob");
    }

    #[test]
    fn test_release_only_by_holder() {
        let mut locks = ElementLocks::new();
        locks.acquire("door-1", "alice", 0, 30_000).unwrap();
        assert!(!locks.release("door-1", "bob"));
        assert!(locks.release("door-1", "alice"));
        assert!(locks.holder("door-1", 1).is_none());
    }

    #[test]
    fn test_expired_leases_do_not_accumulate() {
        let mut locks = ElementLocks::new();
        for i in 0..50 {
            locks.acquire(&format!("panel-{i}"), "alice", 0, 1_000).unwrap();
        }
        assert_eq!(locks.len(), 50);

        locks.acquire("panel-x", "bob", 5_000, 1_000).unwrap();
        assert_eq!(locks.len(), 1);

        let expired = locks.prune_expired(10_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].holder, "bob");
        assert!(locks.is_empty());
    }

    #[test]
    fn test_release_all() {
        let mut locks = ElementLocks::new();
        locks.acquire("a", "alice", 0, 30_000).unwrap();
        locks.acquire("b", "alice", 0, 30_000).unwrap();
        locks.acquire("c", "bob", 0, 30_000).unwrap();

        let mut freed = locks.release_all("alice");
        freed.sort();
        assert_eq!(freed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(locks.live_count(1), 1);
    }
}
