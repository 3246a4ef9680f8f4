//! Write path of the event log: record encoding, the rotating file sink and
//! background archival of rotated files.

pub mod archiver;
pub mod encoder;
pub mod rotating;

pub use archiver::{ArchiveJob, ArchiveStats, Archiver, ArchiverHandle};
pub use encoder::RecordEncoder;
pub use rotating::{ClosedFile, RotatingSink, SinkState};
