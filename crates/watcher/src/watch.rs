//! One long-polling task per endpoint, feeding the streams of a [`WatchSource`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tickertape_core::{
    AllocationEvent, EvaluationEvent, JobEvent, NodeEvent, TaskStateEvent, WatchSource,
};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::client::{Endpoint, ListApi, Listing};
use crate::tracker::{modified_since, TaskEventTracker};

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Longest time one blocking query may wait for a change.
    pub wait: Duration,
    /// First retry delay after a failed query; doubles per failure.
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(300),
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(60),
        }
    }
}

/// Long-polls one endpoint, tracking its index.
struct Poller {
    api: Arc<dyn ListApi>,
    endpoint: Endpoint,
    options: WatchOptions,
    index: u64,
    failures: u32,
}

impl Poller {
    fn new(api: Arc<dyn ListApi>, endpoint: Endpoint, options: WatchOptions) -> Self {
        Self {
            api,
            endpoint,
            options,
            index: 0,
            failures: 0,
        }
    }

    /// Next listing and the index items must exceed to count as changed.
    ///
    /// Failed queries are retried with exponential backoff, forever.
    async fn poll(&mut self) -> (Listing, u64) {
        loop {
            match self.api.list(self.endpoint, self.index, self.options.wait).await {
                Ok(listing) => {
                    if self.failures > 0 {
                        info!(endpoint = %self.endpoint, failures = self.failures, "watch recovered");
                    }
                    self.failures = 0;

                    let since = if listing.index < self.index {
                        warn!(
                            endpoint = %self.endpoint,
                            previous = self.index,
                            index = listing.index,
                            "index went backwards, resyncing"
                        );
                        0
                    } else {
                        self.index
                    };
                    self.index = listing.index;
                    return (listing, since);
                }
                Err(e) => {
                    self.failures += 1;
                    let delay = self.backoff();
                    warn!(
                        endpoint = %self.endpoint,
                        error = %e,
                        retry_in = ?delay,
                        "watch query failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn backoff(&self) -> Duration {
        let exp = self.failures.saturating_sub(1).min(16);
        self.options
            .retry_base
            .saturating_mul(1u32 << exp)
            .min(self.options.retry_max)
    }
}

/// Start the five watchers and return their streams.
///
/// The first listing of each endpoint is emitted whole, as a snapshot of
/// the current state. Each watcher stops once its receivers are dropped.
pub fn spawn_watchers(api: Arc<dyn ListApi>, options: WatchOptions) -> WatchSource {
    let (alloc_tx, alloc_rx) = mpsc::unbounded_channel();
    let (task_tx, task_rx) = mpsc::unbounded_channel();
    let (eval_tx, eval_rx) = mpsc::unbounded_channel();
    let (job_tx, job_rx) = mpsc::unbounded_channel();
    let (node_tx, node_rx) = mpsc::unbounded_channel();

    let poller = |endpoint| Poller::new(api.clone(), endpoint, options.clone());

    tokio::spawn(watch_allocations(poller(Endpoint::Allocations), alloc_tx, task_tx));
    tokio::spawn(watch_items(poller(Endpoint::Evaluations), eval_tx, |item, index, now| {
        EvaluationEvent {
            timestamp: now,
            wait_index: index,
            evaluation: item,
        }
    }));
    tokio::spawn(watch_items(poller(Endpoint::Jobs), job_tx, |item, index, now| JobEvent {
        timestamp: now,
        wait_index: index,
        job: item,
    }));
    tokio::spawn(watch_items(poller(Endpoint::Nodes), node_tx, |item, index, now| NodeEvent {
        timestamp: now,
        wait_index: index,
        node: item,
    }));

    WatchSource::from_receivers(alloc_rx, task_rx, eval_rx, job_rx, node_rx)
}

async fn watch_items<T: Send + 'static>(
    mut poller: Poller,
    tx: UnboundedSender<T>,
    make: fn(Value, u64, DateTime<Utc>) -> T,
) {
    'watch: loop {
        let (listing, since) = tokio::select! {
            _ = tx.closed() => break 'watch,
            polled = poller.poll() => polled,
        };

        let now = Utc::now();
        for item in modified_since(listing.items, since) {
            if tx.send(make(item, listing.index, now)).is_err() {
                break 'watch;
            }
        }
    }
    debug!(endpoint = %poller.endpoint, "watcher stopped");
}

async fn watch_allocations(
    mut poller: Poller,
    alloc_tx: UnboundedSender<AllocationEvent>,
    task_tx: UnboundedSender<TaskStateEvent>,
) {
    let mut tracker = TaskEventTracker::new();

    loop {
        let (listing, since) = tokio::select! {
            _ = both_closed(&alloc_tx, &task_tx) => break,
            polled = poller.poll() => polled,
        };

        {
            let live: HashSet<&str> = listing
                .items
                .iter()
                .filter_map(|a| a.get("ID").and_then(Value::as_str))
                .collect();
            tracker.retain_allocs(&live);
        }

        let now = Utc::now();
        for alloc in modified_since(listing.items, since) {
            let tasks = tracker.observe(&alloc, listing.index, now);
            alloc_tx
                .send(AllocationEvent {
                    timestamp: now,
                    wait_index: listing.index,
                    allocation: alloc,
                })
                .ok();
            for task in tasks {
                task_tx.send(task).ok();
            }
        }
    }
    debug!(endpoint = %poller.endpoint, "watcher stopped");
}

async fn both_closed<A, B>(a: &UnboundedSender<A>, b: &UnboundedSender<B>) {
    a.closed().await;
    b.closed().await;
}
