//! Per-user serialization.
//!
//! Two overlapping orchestrations for one user would race on the
//! read-history / append-turn sequence. `UserLocks` hands out one async
//! mutex per user id; different users never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Map size at which idle entries are swept.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder exists for `user_id`.
    ///
    /// The returned guard releases the user on drop.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle entry: no guard, no waiter.
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(user_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of user ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
