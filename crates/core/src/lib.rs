pub mod config;
pub mod error;
pub mod event;
pub mod period;
pub mod watch;

pub use config::SinkConfig;
pub use error::*;
pub use event::*;
pub use period::{Clock, ManualClock, PeriodKey, RotationPeriod, SystemClock};
pub use watch::WatchSource;
