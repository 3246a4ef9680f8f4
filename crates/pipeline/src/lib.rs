//! Fan-in of the watch source streams and the consumer loop that drives
//! them through the encoder into the rotating sink.

pub mod aggregator;
pub mod pipeline;

pub use aggregator::{Aggregator, MergedEvents};
pub use pipeline::{Pipeline, PipelineStats};
