//! The five typed streams the watch source hands to the pipeline.

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::event::{AllocationEvent, EvaluationEvent, JobEvent, NodeEvent, TaskStateEvent};

/// Output of a watch source: one lazy stream per kind of change.
///
/// Each stream ends when its producer stops. Allocation-level and task-level
/// changes arrive on two separate streams even though one watcher produces
/// both.
pub struct WatchSource {
    pub allocations: BoxStream<'static, AllocationEvent>,
    pub task_states: BoxStream<'static, TaskStateEvent>,
    pub evaluations: BoxStream<'static, EvaluationEvent>,
    pub jobs: BoxStream<'static, JobEvent>,
    pub nodes: BoxStream<'static, NodeEvent>,
}

impl WatchSource {
    /// Build a source from unbounded channel receivers.
    pub fn from_receivers(
        allocations: UnboundedReceiver<AllocationEvent>,
        task_states: UnboundedReceiver<TaskStateEvent>,
        evaluations: UnboundedReceiver<EvaluationEvent>,
        jobs: UnboundedReceiver<JobEvent>,
        nodes: UnboundedReceiver<NodeEvent>,
    ) -> Self {
        Self {
            allocations: receiver_stream(allocations),
            task_states: receiver_stream(task_states),
            evaluations: receiver_stream(evaluations),
            jobs: receiver_stream(jobs),
            nodes: receiver_stream(nodes),
        }
    }
}

fn receiver_stream<T: Send + 'static>(rx: UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}
