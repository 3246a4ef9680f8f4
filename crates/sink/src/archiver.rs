//! Background compression of rotated log files.
//!
//! The archiver listens for [`ClosedFile`] notifications and zips each closed
//! file into `<archive_dir>/<period>.zip` on its own task, so ingestion never
//! waits on compression. Archival is best-effort: failures are logged and the
//! job is dropped. The rotated log itself is never modified or removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tickertape_core::{PeriodKey, Result, RotationPeriod, TickertapeError};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::rotating::ClosedFile;

/// One closed file to compress and where the archive goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub source: PathBuf,
    pub target: PathBuf,
    pub period: PeriodKey,
}

/// Outcome counts reported when the archiver stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub archived: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
pub struct Archiver {
    archive_dir: PathBuf,
}

impl Archiver {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Archive path for a period. Depends only on the period, so archiving
    /// the same file again lands on the same path.
    pub fn archive_path(&self, period: &PeriodKey) -> PathBuf {
        self.archive_dir.join(format!("{period}.zip"))
    }

    pub fn job_for(&self, closed: &ClosedFile) -> ArchiveJob {
        ArchiveJob {
            source: closed.path.clone(),
            target: self.archive_path(&closed.period),
            period: closed.period.clone(),
        }
    }

    /// Compress one file on the blocking pool. Returns the archive path.
    pub async fn archive(&self, job: ArchiveJob) -> Result<PathBuf> {
        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            compress_file(&job)?;
            Ok(job.target)
        })
        .await
        .map_err(|e| TickertapeError::Archive(format!("archive task failed: {e}")))?
    }

    /// Consume close notifications until every sender is dropped.
    ///
    /// Each notification is archived on its own task. When the channel
    /// closes, the dispatcher waits for the jobs still in flight before the
    /// returned handle resolves.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<ClosedFile>) -> ArchiverHandle {
        let handle = tokio::spawn(async move {
            let mut stats = ArchiveStats::default();
            let mut jobs: JoinSet<bool> = JoinSet::new();

            loop {
                tokio::select! {
                    closed = rx.recv() => match closed {
                        Some(closed) => {
                            let job = self.job_for(&closed);
                            let archiver = self.clone();
                            debug!(source = %job.source.display(), "archive job queued");
                            jobs.spawn(async move { archiver.run_job(job).await });
                        }
                        None => break,
                    },
                    Some(done) = jobs.join_next(), if !jobs.is_empty() => {
                        stats.record(done);
                    }
                }
            }

            while let Some(done) = jobs.join_next().await {
                stats.record(done);
            }
            stats
        });

        ArchiverHandle { handle }
    }

    async fn run_job(&self, job: ArchiveJob) -> bool {
        let source = job.source.clone();
        match self.archive(job).await {
            Ok(target) => {
                info!(source = %source.display(), archive = %target.display(), "archived rotated file");
                true
            }
            Err(e) => {
                error!(source = %source.display(), error = %e, "archival failed, job dropped");
                false
            }
        }
    }

    /// Rotated files of periods before `current` that have no archive yet.
    ///
    /// Used at startup to pick up files whose archival never ran, e.g.
    /// because the process stopped right after a rotation. Sorted oldest
    /// first. A missing rotation directory yields nothing. Stale temp files
    /// in the archive directory are removed first.
    pub async fn backlog(
        &self,
        rotation_dir: &Path,
        period: RotationPeriod,
        current: &PeriodKey,
    ) -> Result<Vec<ClosedFile>> {
        self.remove_stale_temp_files().await;

        let mut entries = match tokio::fs::read_dir(rotation_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pending = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| period.parse_key(s))
            else {
                continue;
            };
            if &key >= current || self.archive_path(&key).exists() {
                continue;
            }
            pending.push(ClosedFile { path, period: key });
        }

        pending.sort_by(|a, b| a.period.cmp(&b.period));
        Ok(pending)
    }

    /// Delete half-written archives left by a job that was cut off when the
    /// process stopped. Only safe while no job is running.
    ///
    /// Best effort: returns how many were removed.
    pub async fn remove_stale_temp_files(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.archive_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.archive_dir.display(), error = %e, "cannot scan archive dir");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %self.archive_dir.display(), error = %e, "cannot scan archive dir");
                    break;
                }
            };
            let path = entry.path();
            if !path.file_name().and_then(|n| n.to_str()).is_some_and(is_temp_name) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = %path.display(), "removed stale archive temp file");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot remove stale archive temp file"),
            }
        }
        removed
    }
}

fn temp_name(period: &PeriodKey) -> String {
    format!(".{period}.{}.tmp", Uuid::new_v4())
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

impl ArchiveStats {
    fn record(&mut self, done: std::result::Result<bool, tokio::task::JoinError>) {
        match done {
            Ok(true) => self.archived += 1,
            Ok(false) => self.failed += 1,
            Err(e) => {
                warn!(error = %e, "archive task panicked");
                self.failed += 1;
            }
        }
    }
}

/// Handle to a running archiver.
pub struct ArchiverHandle {
    handle: JoinHandle<ArchiveStats>,
}

impl ArchiverHandle {
    /// Wait until the notification channel is closed and all jobs are done.
    pub async fn join(self) -> ArchiveStats {
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "archiver dispatcher stopped abnormally");
                ArchiveStats::default()
            }
        }
    }
}

fn archive_err(context: &str, path: &Path, e: impl std::fmt::Display) -> TickertapeError {
    TickertapeError::Archive(format!("{context} {}: {e}", path.display()))
}

/// Write `job.source` as the single deflated entry of a zip at `job.target`.
///
/// The zip is built under a temporary name in the archive directory and
/// renamed into place only once complete and synced, so a visible archive
/// is always a whole one.
fn compress_file(job: &ArchiveJob) -> Result<()> {
    let dir = job
        .target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| archive_err("cannot create", dir, e))?;

    let entry_name = job
        .source
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| archive_err("no file name in", &job.source, "invalid path"))?;

    let mut source = fs::File::open(&job.source).map_err(|e| archive_err("cannot open", &job.source, e))?;
    let size = source
        .metadata()
        .map_err(|e| archive_err("cannot stat", &job.source, e))?
        .len();

    let tmp = dir.join(temp_name(&job.period));
    if let Err(e) = write_zip(&mut source, &tmp, &entry_name, size) {
        fs::remove_file(&tmp).ok();
        return Err(e);
    }

    fs::rename(&tmp, &job.target).map_err(|e| {
        fs::remove_file(&tmp).ok();
        archive_err("cannot move archive to", &job.target, e)
    })?;

    debug!(archive = %job.target.display(), raw_bytes = size, "archive written");
    Ok(())
}

fn write_zip(source: &mut fs::File, tmp: &Path, entry_name: &str, size: u64) -> Result<()> {
    let file = fs::File::create(tmp).map_err(|e| archive_err("cannot create", tmp, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64)
        .unix_permissions(0o644);

    zip.start_file(entry_name, options)
        .map_err(|e| archive_err("cannot start entry in", tmp, e))?;
    io::copy(source, &mut zip).map_err(|e| archive_err("cannot compress into", tmp, e))?;
    let file = zip.finish().map_err(|e| archive_err("cannot finish", tmp, e))?;
    file.sync_all().map_err(|e| archive_err("cannot sync", tmp, e))?;
    Ok(())
}
