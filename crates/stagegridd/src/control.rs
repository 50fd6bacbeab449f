//! Background loops feeding and draining the work queue.
//!
//! - [`EventWatcher`] turns store events into queued rollouts.
//! - [`resync_loop`] periodically queues every rollout.
//! - [`worker_loop`] is the single consumer that runs passes.
//!
//! All three stop when the shutdown channel flips.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use stagegrid_rollout::EventCorrelator;
use stagegrid_state::{EventKind, StateStore, StoreEvent};

use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;

/// Queue every stored rollout. Returns how many were newly queued.
pub async fn enqueue_all(store: &StateStore, queue: &WorkQueue) -> usize {
    let rollouts = match store.list_rollouts() {
        Ok(rollouts) => rollouts,
        Err(e) => {
            error!(error = %e, "failed to list rollouts for resync");
            return 0;
        }
    };
    let mut queued = 0;
    for rollout in rollouts {
        if queue.add(rollout.key()).await {
            queued += 1;
        }
    }
    queued
}

/// Subscribes to store events and queues the rollouts they affect.
pub struct EventWatcher {
    store: StateStore,
    events: broadcast::Receiver<StoreEvent>,
    correlator: EventCorrelator<StateStore>,
    queue: WorkQueue,
}

impl EventWatcher {
    /// Subscribe now; events published after this call are not missed.
    pub fn new(store: StateStore, queue: WorkQueue) -> Self {
        Self {
            events: store.subscribe(),
            correlator: EventCorrelator::new(store.clone()),
            store,
            queue,
        }
    }

    /// Handle one event.
    pub async fn handle(&self, event: StoreEvent) {
        match event {
            StoreEvent::Unit { unit, .. } => {
                for key in self.correlator.map(&unit) {
                    self.queue.add(key).await;
                }
            }
            StoreEvent::Rollout {
                kind: EventKind::Upserted,
                key,
            } => {
                self.queue.add(key).await;
            }
            StoreEvent::Rollout {
                kind: EventKind::Deleted,
                key,
            } => {
                if self.queue.forget(&key).await {
                    debug!(rollout = %key, "dropped pending work for deleted rollout");
                }
            }
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("event watcher started");
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Ok(event) => self.handle(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event watcher lagged, resyncing");
                        enqueue_all(&self.store, &self.queue).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        debug!("event watcher stopped");
    }
}

/// Queue every rollout now and then every `interval`.
pub async fn resync_loop(
    store: StateStore,
    queue: WorkQueue,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let queued = enqueue_all(&store, &queue).await;
                debug!(queued, "resync");
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("resync loop stopped");
}

/// Drain the queue one rollout at a time.
pub async fn worker_loop(
    mut reconciler: Reconciler,
    queue: WorkQueue,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("rollout worker started");
    loop {
        tokio::select! {
            key = queue.next() => {
                if let Some(delay) = reconciler.process(&key).await {
                    queue.add_after(key, delay);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("rollout worker stopped");
}
