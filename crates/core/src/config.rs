use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TickertapeError};
use crate::period::RotationPeriod;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key).map(|v| v.to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

// ── Sink ──────────────────────────────────────────────────────

/// Everything the sink and archiver need, passed in at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Cut the log into one file per period under `rotation_dir`.
    pub rotation_enabled: bool,
    /// Zip each rotated file into `archive_dir`. Ignored without rotation.
    pub archival_enabled: bool,
    /// The single append-only file used when rotation is off.
    pub output_path: PathBuf,
    pub rotation_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub rotation_period: RotationPeriod,
    /// fsync after every record, not just flush.
    pub sync_writes: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        let rotation_dir = PathBuf::from("events");
        Self {
            rotation_enabled: false,
            archival_enabled: false,
            output_path: PathBuf::from("events.log"),
            archive_dir: rotation_dir.join("archive"),
            rotation_dir,
            rotation_period: RotationPeriod::Daily,
            sync_writes: true,
        }
    }
}

impl SinkConfig {
    /// Fixed-file configuration: no rotation, no archival.
    pub fn fixed(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..Self::default()
        }
    }

    /// Rotating configuration with the archive directory nested under `rotation_dir`.
    pub fn rotating(rotation_dir: impl Into<PathBuf>, period: RotationPeriod) -> Self {
        let rotation_dir = rotation_dir.into();
        Self {
            rotation_enabled: true,
            archive_dir: rotation_dir.join("archive"),
            rotation_dir,
            rotation_period: period,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_archive_dir(mut self, archive_dir: impl Into<PathBuf>) -> Self {
        self.archival_enabled = true;
        self.archive_dir = archive_dir.into();
        self
    }

    /// Build config from `TICKERTAPE_*` environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self> {
        let rotation_dir = PathBuf::from(env_or("TICKERTAPE_ROTATION_DIR", "events"));
        let archive_dir = env_opt("TICKERTAPE_ARCHIVE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| rotation_dir.join("archive"));
        let rotation_period = env_or("TICKERTAPE_ROTATION_PERIOD", "daily")
            .parse()
            .map_err(TickertapeError::Config)?;

        Ok(Self {
            rotation_enabled: env_bool("TICKERTAPE_LOG_ROTATE", false),
            archival_enabled: env_bool("TICKERTAPE_ARCHIVE", false),
            output_path: PathBuf::from(env_or("TICKERTAPE_EVENT_FILE", "events.log")),
            rotation_dir,
            archive_dir,
            rotation_period,
            sync_writes: env_bool("TICKERTAPE_SYNC_WRITES", true),
        })
    }

    /// Reject configurations the sink cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rotation_enabled {
            if self.rotation_dir.as_os_str().is_empty() {
                return Err(TickertapeError::Config("rotation directory is empty".into()));
            }
            if self.archival_enabled && self.archive_dir.as_os_str().is_empty() {
                return Err(TickertapeError::Config("archive directory is empty".into()));
            }
        } else if self.output_path.as_os_str().is_empty() {
            return Err(TickertapeError::Config("output path is empty".into()));
        }
        Ok(())
    }

    /// Whether closed files will actually be archived.
    pub fn archives(&self) -> bool {
        self.rotation_enabled && self.archival_enabled
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        if self.rotation_enabled {
            tracing::info!(
                "  sink:     rotating {} into {}",
                self.rotation_period,
                self.rotation_dir.display()
            );
            if self.archival_enabled {
                tracing::info!("  archive:  {}", self.archive_dir.display());
            } else {
                tracing::info!("  archive:  disabled");
            }
        } else {
            tracing::info!("  sink:     fixed file {}", self.output_path.display());
            if self.archival_enabled {
                tracing::warn!("archival requested without rotation; archival disabled");
            }
        }
        tracing::info!("  sync:     {}", if self.sync_writes { "fsync" } else { "flush only" });
    }
}
