use std::collections::BTreeMap;
use std::future::{self, Future};
use std::sync::Arc;

use serde::Serialize;
use tickertape_core::{Clock, Event, EventKind, Result, SinkConfig};
use tickertape_sink::{Archiver, ArchiverHandle, RecordEncoder, RotatingSink};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::aggregator::{Aggregator, MergedEvents};

/// Counters reported when the pipeline stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub events_written: u64,
    pub bytes_written: u64,
    pub rotations: u64,
    pub per_kind: BTreeMap<EventKind, u64>,
    pub archived: u64,
    pub archive_failures: u64,
}

/// Aggregator → encoder → rotating sink, with the archiver hanging off the
/// sink's close notifications.
pub struct Pipeline {
    events: MergedEvents,
    sink: RotatingSink,
    encoder: RecordEncoder,
    archiver: Option<ArchiverHandle>,
    stats: PipelineStats,
}

impl Pipeline {
    /// Open the sink, start the archiver (if configured) and the producers.
    ///
    /// The sink is opened before any producer runs, so a sink that cannot
    /// open never consumes an event. With archival on, rotated files of
    /// earlier periods that were never archived are queued first.
    pub async fn start(config: &SinkConfig, clock: Arc<dyn Clock>, aggregator: Aggregator) -> Result<Self> {
        let (closed_tx, archiver) = if config.archives() {
            let (tx, rx) = mpsc::unbounded_channel();
            let archiver = Archiver::new(&config.archive_dir);
            (Some(tx), Some((archiver, rx)))
        } else {
            (None, None)
        };

        let sink = RotatingSink::open(config, clock, closed_tx.clone()).await?;

        let archiver = match archiver {
            Some((archiver, rx)) => {
                if let (Some(tx), Some(current)) = (&closed_tx, sink.current_period()) {
                    match archiver
                        .backlog(&config.rotation_dir, config.rotation_period, current)
                        .await
                    {
                        Ok(backlog) => {
                            if !backlog.is_empty() {
                                info!(files = backlog.len(), "queueing unarchived rotated files");
                            }
                            for closed in backlog {
                                tx.send(closed).ok();
                            }
                        }
                        Err(e) => warn!(error = %e, "could not scan for unarchived files"),
                    }
                }
                Some(archiver.spawn(rx))
            }
            None => None,
        };
        drop(closed_tx);

        let sources = aggregator.len();
        let events = aggregator.spawn();
        info!(sources, "pipeline started");

        Ok(Self {
            events,
            sink,
            encoder: RecordEncoder::new(),
            archiver,
            stats: PipelineStats::default(),
        })
    }

    /// Run until every source is exhausted or a fatal error occurs.
    pub async fn run(self) -> Result<PipelineStats> {
        self.run_until(future::pending()).await
    }

    /// Run until every source is exhausted, `shutdown` resolves, or a fatal
    /// error occurs.
    ///
    /// On a clean stop the sink is closed and in-flight archival is awaited.
    /// On a fatal error nothing more is written and the error is returned.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = self.events.next() => event,
            };

            let Some(event) = next else {
                info!("all watch streams exhausted");
                break;
            };

            if let Err(e) = self.deliver(event).await {
                error!(error = %e, written = self.stats.events_written, "fatal error, pipeline stopped");
                return Err(e);
            }
        }

        self.finish().await
    }

    async fn deliver(&mut self, event: Event) -> Result<()> {
        let kind = event.kind();
        let record = self.encoder.encode(&event)?;
        self.sink.write(record).await?;

        self.stats.events_written += 1;
        self.stats.bytes_written += record.len() as u64;
        *self.stats.per_kind.entry(kind).or_default() += 1;
        Ok(())
    }

    async fn finish(mut self) -> Result<PipelineStats> {
        // Producers stop here; events still queued in the merge channel go with them.
        drop(self.events);
        self.sink.close().await?;
        self.stats.rotations = self.sink.rotations();

        if let Some(archiver) = self.archiver.take() {
            let archive = archiver.join().await;
            self.stats.archived = archive.archived;
            self.stats.archive_failures = archive.failed;
        }

        info!(
            events = self.stats.events_written,
            bytes = self.stats.bytes_written,
            rotations = self.stats.rotations,
            archived = self.stats.archived,
            archive_failures = self.stats.archive_failures,
            "pipeline finished"
        );
        Ok(self.stats)
    }
}
