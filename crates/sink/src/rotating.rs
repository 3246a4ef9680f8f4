//! The single-writer output file with period-based rotation.
//!
//! # Lifecycle
//!
//! ```text
//!   open() ──► Open ──write()──► Open
//!               │   (period changed: close old, notify, open new, write)
//!               ├──close()──► Closed
//!               └──I/O error──► Failed
//! ```
//!
//! Every record is written, flushed and (unless disabled) fsynced before
//! `write` returns, so nothing is left in a user-space buffer if the process
//! dies between writes.
//!
//! Rotation is write-driven: the period is checked against the clock on each
//! write, and a file stays open across an idle boundary until the first
//! record of a later period arrives. Idle periods never produce a file.
//! Periods only move forward: if the clock steps back, records keep going
//! to the file already open.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tickertape_core::{Clock, PeriodKey, Result, RotationPeriod, SinkConfig, TickertapeError};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Notification that a rotated file has been closed and will not be written again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedFile {
    pub path: PathBuf,
    pub period: PeriodKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Open,
    /// Closed at shutdown.
    Closed,
    /// A write, open or close failed. No further records are accepted.
    Failed,
}

#[derive(Debug)]
enum Target {
    Fixed(PathBuf),
    Rotating { dir: PathBuf, period: RotationPeriod },
}

/// The currently open output file.
struct SinkFile {
    path: PathBuf,
    period: Option<PeriodKey>,
    file: File,
    records: u64,
    bytes: u64,
}

impl SinkFile {
    async fn open(path: PathBuf, period: Option<PeriodKey>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| TickertapeError::Open {
                    path: path.clone(),
                    source,
                })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| TickertapeError::Open {
                path: path.clone(),
                source,
            })?;

        let dropped = trim_partial_tail(&path)
            .await
            .map_err(|source| TickertapeError::Open {
                path: path.clone(),
                source,
            })?;
        if dropped > 0 {
            warn!(
                path = %path.display(),
                dropped_bytes = dropped,
                "removed unterminated record left by an interrupted write"
            );
        }

        Ok(Self {
            path,
            period,
            file,
            records: 0,
            bytes: 0,
        })
    }

    async fn append(&mut self, record: &[u8], sync: bool) -> Result<()> {
        let write = async {
            self.file.write_all(record).await?;
            self.file.flush().await?;
            if sync {
                self.file.sync_data().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        write.await.map_err(|source| TickertapeError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.records += 1;
        self.bytes += record.len() as u64;
        Ok(())
    }

    /// Flush, sync and release the handle. Waits for any in-flight
    /// operation so the file is really closed when this returns.
    async fn close(mut self, sync: bool) -> Result<(PathBuf, Option<PeriodKey>)> {
        let finish = async {
            self.file.flush().await?;
            if sync {
                self.file.sync_all().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        finish.await.map_err(|source| TickertapeError::Close {
            path: self.path.clone(),
            source,
        })?;

        drop(self.file.into_std().await);

        debug!(
            path = %self.path.display(),
            records = self.records,
            bytes = self.bytes,
            "closed sink file"
        );
        Ok((self.path, self.period))
    }
}

/// Cut a regular file back to its last newline.
///
/// A record that was never fully written (the process died mid-write) would
/// otherwise be glued to the next record appended. Returns the number of
/// bytes removed.
async fn trim_partial_tail(path: &Path) -> std::io::Result<u64> {
    let mut file = OpenOptions::new().read(true).write(true).open(path).await?;
    let meta = file.metadata().await?;
    let len = meta.len();
    if !meta.is_file() || len == 0 {
        return Ok(0);
    }

    let mut buf = vec![0u8; TAIL_CHUNK];
    let mut end = len;
    loop {
        let start = end.saturating_sub(TAIL_CHUNK as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;

        if end == len && chunk.last() == Some(&b'\n') {
            return Ok(0);
        }
        let keep = match chunk.iter().rposition(|&b| b == b'\n') {
            Some(i) => start + i as u64 + 1,
            None if start == 0 => 0,
            None => {
                end = start;
                continue;
            }
        };
        file.set_len(keep).await?;
        file.sync_all().await?;
        return Ok(len - keep);
    }
}

const TAIL_CHUNK: usize = 4096;

/// Sole owner of the log file being written.
///
/// All mutation goes through `&mut self`, so close, notify, reopen and the
/// pending write of a rotation can never interleave with another write.
pub struct RotatingSink {
    target: Target,
    clock: Arc<dyn Clock>,
    sync_writes: bool,
    current: Option<SinkFile>,
    state: SinkState,
    closed_tx: Option<mpsc::UnboundedSender<ClosedFile>>,
    rotations: u64,
}

impl RotatingSink {
    /// Open the sink and its first file.
    ///
    /// In rotating mode the first file is named for the current period and
    /// appended to if it already exists (restart within the same period).
    /// `closed_tx` receives one [`ClosedFile`] per rotation; pass `None` to
    /// rotate without notifying anyone.
    pub async fn open(
        config: &SinkConfig,
        clock: Arc<dyn Clock>,
        closed_tx: Option<mpsc::UnboundedSender<ClosedFile>>,
    ) -> Result<Self> {
        config.validate()?;

        let target = if config.rotation_enabled {
            Target::Rotating {
                dir: config.rotation_dir.clone(),
                period: config.rotation_period,
            }
        } else {
            Target::Fixed(config.output_path.clone())
        };

        let mut sink = Self {
            target,
            clock,
            sync_writes: config.sync_writes,
            current: None,
            state: SinkState::Open,
            closed_tx,
            rotations: 0,
        };

        let first = match &sink.target {
            Target::Fixed(path) => SinkFile::open(path.clone(), None).await?,
            Target::Rotating { period, .. } => {
                let key = period.key_for(&sink.clock.now());
                let path = sink.path_for(&key);
                SinkFile::open(path, Some(key)).await?
            }
        };
        info!(path = %first.path.display(), "sink opened");
        sink.current = Some(first);

        Ok(sink)
    }

    /// Path of the file holding records of `period` (rotating mode), or the
    /// fixed output path.
    pub fn path_for(&self, period: &PeriodKey) -> PathBuf {
        match &self.target {
            Target::Fixed(path) => path.clone(),
            Target::Rotating { dir, .. } => dir.join(format!("{period}.log")),
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|f| f.path.as_path())
    }

    pub fn current_period(&self) -> Option<&PeriodKey> {
        self.current.as_ref().and_then(|f| f.period.as_ref())
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Number of rotations performed since open.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Append one encoded record, rotating first if the period has changed.
    ///
    /// Any error is fatal: the sink moves to [`SinkState::Failed`] and
    /// rejects every later write.
    pub async fn write(&mut self, record: &[u8]) -> Result<()> {
        match self.state {
            SinkState::Open => {}
            SinkState::Closed => return Err(TickertapeError::SinkClosed),
            SinkState::Failed => return Err(TickertapeError::SinkFailed),
        }

        let result = self.write_inner(record).await;
        if result.is_err() {
            self.state = SinkState::Failed;
        }
        result
    }

    async fn write_inner(&mut self, record: &[u8]) -> Result<()> {
        if let Target::Rotating { period, .. } = self.target {
            let now = self.clock.now();
            let key = period.key_for(&now);
            match self.current_period() {
                Some(current) if key < *current => {
                    // Clock stepped back: a period already left is never reopened.
                    debug!(clock = %key, current = %current, "clock behind open period, keeping file");
                }
                Some(current) if key == *current => {}
                _ => {
                    self.rotate(key).await?;
                    debug!(earliest = %period.next_boundary(&now), "next rotation");
                }
            }
        }

        let sync = self.sync_writes;
        let file = self.current.as_mut().ok_or(TickertapeError::SinkFailed)?;
        file.append(record, sync).await
    }

    async fn rotate(&mut self, next: PeriodKey) -> Result<()> {
        if let Some(old) = self.current.take() {
            let (path, period) = old.close(self.sync_writes).await?;
            if let Some(period) = period {
                info!(path = %path.display(), period = %period, next = %next, "rotated sink file");
                self.notify_closed(ClosedFile { path, period });
            }
        }

        let path = self.path_for(&next);
        self.current = Some(SinkFile::open(path, Some(next)).await?);
        self.rotations += 1;
        Ok(())
    }

    fn notify_closed(&self, closed: ClosedFile) {
        if let Some(tx) = &self.closed_tx {
            if let Err(e) = tx.send(closed) {
                warn!(
                    path = %e.0.path.display(),
                    "close listener is gone, rotated file will not be archived"
                );
            }
        }
    }

    /// Flush and close the open file. Terminal; later writes are rejected.
    ///
    /// The file closed here is not announced as rotated: its period may still
    /// be current and a restart would append to it.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SinkState::Closed {
            return Ok(());
        }
        let current = self.current.take();
        self.state = SinkState::Closed;
        self.closed_tx = None;

        if let Some(file) = current {
            let records = file.records;
            let (path, _) = file.close(self.sync_writes).await?;
            info!(path = %path.display(), records, rotations = self.rotations, "sink closed");
        }
        Ok(())
    }
}

impl Drop for RotatingSink {
    fn drop(&mut self) {
        // Records are flushed per write, so dropping the handle loses nothing.
        if let Some(file) = &self.current {
            debug!(path = %file.path.display(), "sink dropped without close");
        }
    }
}
