use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An allocation changed (placed, updated, stopped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub timestamp: DateTime<Utc>,
    /// Orchestrator index at which the change was observed.
    pub wait_index: u64,
    pub allocation: Value,
}

/// A task inside an allocation recorded a new task event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStateEvent {
    pub timestamp: DateTime<Utc>,
    pub wait_index: u64,
    pub alloc_id: String,
    pub job_id: String,
    pub node_id: String,
    pub task_group: String,
    pub task: String,
    pub state: String,
    pub task_event: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationEvent {
    pub timestamp: DateTime<Utc>,
    pub wait_index: u64,
    pub evaluation: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub timestamp: DateTime<Utc>,
    pub wait_index: u64,
    pub job: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub timestamp: DateTime<Utc>,
    pub wait_index: u64,
    pub node: Value,
}

/// One change event from the watch source.
///
/// The pipeline never looks inside the payloads; it only moves and
/// serializes them. The serialized form is adjacently tagged so each
/// record can be decoded on its own:
/// `{"kind":"allocation","event":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum Event {
    Allocation(AllocationEvent),
    TaskState(TaskStateEvent),
    Evaluation(EvaluationEvent),
    Job(JobEvent),
    Node(NodeEvent),
}

/// Discriminant of [`Event`], used for logging and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Allocation,
    TaskState,
    Evaluation,
    Job,
    Node,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Allocation(_) => EventKind::Allocation,
            Event::TaskState(_) => EventKind::TaskState,
            Event::Evaluation(_) => EventKind::Evaluation,
            Event::Job(_) => EventKind::Job,
            Event::Node(_) => EventKind::Node,
        }
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Allocation => "allocation",
            EventKind::TaskState => "task_state",
            EventKind::Evaluation => "evaluation",
            EventKind::Job => "job",
            EventKind::Node => "node",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AllocationEvent> for Event {
    fn from(e: AllocationEvent) -> Self {
        Event::Allocation(e)
    }
}

impl From<TaskStateEvent> for Event {
    fn from(e: TaskStateEvent) -> Self {
        Event::TaskState(e)
    }
}

impl From<EvaluationEvent> for Event {
    fn from(e: EvaluationEvent) -> Self {
        Event::Evaluation(e)
    }
}

impl From<JobEvent> for Event {
    fn from(e: JobEvent) -> Self {
        Event::Job(e)
    }
}

impl From<NodeEvent> for Event {
    fn from(e: NodeEvent) -> Self {
        Event::Node(e)
    }
}
