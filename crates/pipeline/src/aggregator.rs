//! Many-to-one merge of independent event streams.
//!
//! # Ordering contract
//!
//! Events are delivered in the order they reach the merge point. Events of
//! one source keep their relative order; there is no ordering between
//! sources. Each event is delivered exactly once.
//!
//! # Backpressure
//!
//! Every source runs on its own producer task and hands events to a bounded
//! channel with one slot per source. A slow source never holds back the
//! others, but a slow consumer fills the channel and parks every producer
//! on its next send.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};
use tickertape_core::{Event, WatchSource};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

struct Source {
    name: &'static str,
    stream: BoxStream<'static, Event>,
}

/// Collects the sources to merge. Nothing runs until [`spawn`](Self::spawn).
#[derive(Default)]
pub struct Aggregator {
    sources: Vec<Source>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five streams of a watch source.
    pub fn from_watch(watch: WatchSource) -> Self {
        Self::new()
            .with_source("allocations", watch.allocations)
            .with_source("task_states", watch.task_states)
            .with_source("evaluations", watch.evaluations)
            .with_source("jobs", watch.jobs)
            .with_source("nodes", watch.nodes)
    }

    #[must_use]
    pub fn with_source<S, T>(mut self, name: &'static str, stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        T: Into<Event> + 'static,
    {
        self.sources.push(Source {
            name,
            stream: stream.map(Into::into).boxed(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Start one producer task per source and return the merged stream.
    ///
    /// Must be called inside a tokio runtime. The merged stream ends once
    /// every source has ended.
    pub fn spawn(self) -> MergedEvents {
        let (tx, rx) = mpsc::channel(self.sources.len().max(1));

        let producers = self
            .sources
            .into_iter()
            .map(|Source { name, mut stream }| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut forwarded: u64 = 0;
                    while let Some(event) = stream.next().await {
                        if tx.send(event).await.is_err() {
                            debug!(source = name, forwarded, "merge consumer gone, producer stopping");
                            return;
                        }
                        forwarded += 1;
                    }
                    debug!(source = name, forwarded, "watch stream exhausted");
                })
            })
            .collect();

        MergedEvents { rx, producers }
    }
}

/// The merged output of an [`Aggregator`].
///
/// Dropping it stops all producer tasks.
pub struct MergedEvents {
    rx: mpsc::Receiver<Event>,
    producers: Vec<JoinHandle<()>>,
}

impl MergedEvents {
    /// Next event in arrival order; `None` once all sources are exhausted.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Number of sources that have not ended yet.
    pub fn active_sources(&self) -> usize {
        self.producers.iter().filter(|p| !p.is_finished()).count()
    }
}

impl Stream for MergedEvents {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for MergedEvents {
    fn drop(&mut self) {
        for producer in &self.producers {
            producer.abort();
        }
    }
}
