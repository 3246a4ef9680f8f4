//! Rotation periods and the wall clock used to pick them.
//!
//! A file's period is derived from the time the event was *delivered* to the
//! sink, never from timestamps inside the event. All periods are computed in
//! UTC.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// How long one output file stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPeriod {
    Hourly,
    #[default]
    Daily,
}

impl RotationPeriod {
    fn key_format(&self) -> &'static str {
        match self {
            RotationPeriod::Hourly => "%Y-%m-%dT%H",
            RotationPeriod::Daily => "%Y-%m-%d",
        }
    }

    /// Derive the period key for a delivery time ("2025-06-14" or "2025-06-14T09").
    pub fn key_for(&self, ts: &DateTime<Utc>) -> PeriodKey {
        PeriodKey(ts.format(self.key_format()).to_string())
    }

    /// Parse a key previously produced by [`key_for`](Self::key_for).
    ///
    /// Returns `None` for anything that does not round-trip exactly, so stray
    /// files in the rotation directory are never mistaken for period files.
    pub fn parse_key(&self, s: &str) -> Option<PeriodKey> {
        let start = match self {
            RotationPeriod::Daily => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)?,
            RotationPeriod::Hourly => {
                let (date, hour) = s.split_once('T')?;
                let hour: u32 = hour.parse().ok()?;
                NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .ok()?
                    .and_hms_opt(hour, 0, 0)?
            }
        };
        let key = self.key_for(&start.and_utc());
        (key.as_str() == s).then_some(key)
    }

    /// Start of the period following the one containing `ts`.
    pub fn next_boundary(&self, ts: &DateTime<Utc>) -> DateTime<Utc> {
        let hour_start = ts
            .with_nanosecond(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_minute(0))
            .unwrap_or(*ts);
        match self {
            RotationPeriod::Hourly => hour_start + Duration::hours(1),
            RotationPeriod::Daily => {
                let day_start = hour_start.with_hour(0).unwrap_or(hour_start);
                day_start + Duration::days(1)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RotationPeriod::Hourly => "hourly",
            RotationPeriod::Daily => "daily",
        }
    }
}

impl fmt::Display for RotationPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" | "hour" => Ok(RotationPeriod::Hourly),
            "daily" | "day" => Ok(RotationPeriod::Daily),
            other => Err(format!("unknown rotation period: {other} (expected daily or hourly)")),
        }
    }
}

/// Identity of one rotation period, also used as the file and archive stem.
///
/// Keys of the same [`RotationPeriod`] sort chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Source of delivery time for rotation decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, ts: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = ts;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
