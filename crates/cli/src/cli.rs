use std::path::PathBuf;

use clap::Parser;
use tickertape_core::{RotationPeriod, SinkConfig};

/// Record Nomad cluster events to an append-only JSON-lines log.
///
/// Allocations, task states, evaluations, jobs and nodes are watched
/// through blocking queries and written one event per line. With
/// `--log-rotate` the log is cut per period and old periods can be zipped.
#[derive(Parser, Debug)]
#[command(name = "tickertape", version, about = "Record Nomad cluster events to a JSON-lines log")]
pub struct CliArgs {
    /// Verbose diagnostics (overridden by RUST_LOG)
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Cut the event log into one file per period
    #[arg(long, env = "LOG_ROTATE")]
    pub log_rotate: bool,

    /// Write diagnostics as JSON to this file instead of the terminal
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Event log file, or the directory of period files with --log-rotate
    #[arg(long, env = "EVENT_FILE")]
    pub event_file: PathBuf,

    /// Zip each rotated file once its period is over
    #[arg(long)]
    pub archive: bool,

    /// Where archives go (default: <event-file>/archive)
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,

    /// Rotation period: daily or hourly
    #[arg(long)]
    pub rotation_period: Option<RotationPeriod>,

    /// Flush records without fsync
    #[arg(long)]
    pub no_sync: bool,
}

impl CliArgs {
    /// Overlay the command line on `base` (usually `SinkConfig::from_env()`).
    pub fn sink_config(&self, mut base: SinkConfig) -> SinkConfig {
        let derived_archive_dir = base.archive_dir == base.rotation_dir.join("archive");

        base.rotation_enabled |= self.log_rotate;
        base.archival_enabled |= self.archive;
        base.output_path = self.event_file.clone();
        base.rotation_dir = self.event_file.clone();

        if let Some(dir) = &self.archive_dir {
            base.archive_dir = dir.clone();
        } else if derived_archive_dir {
            base.archive_dir = self.event_file.join("archive");
        }
        if let Some(period) = self.rotation_period {
            base.rotation_period = period;
        }
        if self.no_sync {
            base.sync_writes = false;
        }
        base
    }
}
