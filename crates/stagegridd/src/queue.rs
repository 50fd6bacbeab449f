//! Work queue of rollout keys.
//!
//! A key is queued at most once: adding a key that is already pending is a
//! no-op. The daemon drains the queue with a single worker, so a rollout is
//! never evaluated by two passes at the same time.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use stagegrid_state::RolloutKey;

#[derive(Default)]
struct Pending {
    order: VecDeque<RolloutKey>,
    keys: HashSet<RolloutKey>,
}

#[derive(Default)]
struct Inner {
    pending: Mutex<Pending>,
    notify: Notify,
}

/// De-duplicating FIFO of rollouts awaiting a pass.
#[derive(Clone, Default)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key`. Returns false if it was already pending.
    pub async fn add(&self, key: RolloutKey) -> bool {
        let mut pending = self.inner.pending.lock().await;
        if !pending.keys.insert(key.clone()) {
            return false;
        }
        debug!(rollout = %key, "rollout queued");
        pending.order.push_back(key);
        drop(pending);
        self.inner.notify.notify_one();
        true
    }

    /// Queue `key` once `delay` has elapsed.
    pub fn add_after(&self, key: RolloutKey, delay: Duration) {
        let queue = self.clone();
        debug!(rollout = %key, ?delay, "rollout scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Drop `key` if it is pending. Returns true if it was.
    pub async fn forget(&self, key: &RolloutKey) -> bool {
        let mut pending = self.inner.pending.lock().await;
        if !pending.keys.remove(key) {
            return false;
        }
        pending.order.retain(|k| k != key);
        true
    }

    pub async fn len(&self) -> usize {
        self.inner.pending.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait for and remove the oldest pending key.
    pub async fn next(&self) -> RolloutKey {
        loop {
            {
                let mut pending = self.inner.pending.lock().await;
                if let Some(key) = pending.order.pop_front() {
                    pending.keys.remove(&key);
                    return key;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}
