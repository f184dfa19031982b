//! Per-user exclusion for reconciliation

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex: one lock per user, created on demand.
///
/// Entries nobody holds or waits on are pruned on the next acquire.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(user.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Users with a live lock entry
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let guard = locks.acquire("alice").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("alice").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let _alice = locks.acquire("alice").await;
        tokio::time::timeout(Duration::from_millis(100), locks.acquire("bob"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = UserLocks::new();
        drop(locks.acquire("alice").await);
        drop(locks.acquire("bob").await);
        let _carol = locks.acquire("carol").await;
        assert_eq!(locks.active(), 1);
    }
}
